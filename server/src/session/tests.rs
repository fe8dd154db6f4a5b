use super::lifecycle::Hook;
use super::testing::{account, detached, detached_handle_with_outbound, test_context, TestClient};
use super::{DeliveryError, SessionMessage};
use crate::area::{ADVENTURE_HUB, INITIAL_VILLAGE};
use crate::catalog::{BURO, INITIAL_PET, ORANGE_SUGAR};
use std::time::Duration;
use towber_protocol::{
    BagKind, BattleEvent, ChatChannel, ClientId, ClientMessage, NpcAction, NpcId, PlayerId, ServerMessage,
    SessionPhase, Vector2,
};

fn enter_hub() -> ClientMessage {
    ClientMessage::EnterArea {
        area: ADVENTURE_HUB.to_string(),
        entrance: 0,
    }
}

/// Spawn point of every hub entrance.
const HUB_SPAWN: Vector2 = Vector2::new(152.0, 240.0);

fn entered_at(message: &ServerMessage, who: PlayerId, at: Vector2) -> bool {
    matches!(message, ServerMessage::PlayerEnter { player, position, .. } if *player == who && *position == at)
}

/// Log both players in and move them to the hub, returning once `a` sees `b` there.
async fn both_in_hub(
    ctx: &std::sync::Arc<crate::ServerContext>,
    a: (&str, PlayerId),
    b: (&str, PlayerId),
) -> (TestClient, TestClient) {
    let mut first = TestClient::login(ctx, a.0).await;
    let mut second = TestClient::login(ctx, b.0).await;
    first.send(enter_hub());
    first.expect(|m| entered_at(m, a.1, HUB_SPAWN)).await;
    second.send(enter_hub());
    second.expect(|m| entered_at(m, b.1, HUB_SPAWN)).await;
    first.expect(|m| entered_at(m, b.1, HUB_SPAWN)).await;
    (first, second)
}

#[tokio::test]
async fn test_connected_only_accepts_auth() {
    let t = test_context();
    let mut client = TestClient::connect(&t.ctx);
    client.send(ClientMessage::Chat {
        channel: ChatChannel::Global,
        text: "hello".into(),
    });
    assert_eq!(client.recv().await, ServerMessage::deny("please log in first"));

    client.send(ClientMessage::Login {
        username: "nobody".into(),
        password: "pw".into(),
    });
    assert_eq!(client.recv().await, ServerMessage::deny("error username or password"));
}

#[tokio::test]
async fn test_hooks_run_in_order() {
    let t = test_context();
    let player = account(&t.ctx, "alice", false);
    let mut client = TestClient::login(&t.ctx, "alice").await;
    client.close().await;

    let hooks = t.log.hooks_for(&[client.initial_id, ClientId::from(player)]);
    assert_eq!(
        hooks,
        vec![
            (Hook::Enter, SessionPhase::Connected),
            (Hook::Exit, SessionPhase::Connected),
            (Hook::Enter, SessionPhase::InGame),
            (Hook::Cleanup, SessionPhase::InGame),
        ]
    );
    assert_eq!(t.ctx.hub.logged_in_count(), 0);
    assert_eq!(t.ctx.hub.unauthenticated_count(), 0);
}

#[tokio::test]
async fn test_duplicate_login_is_denied() {
    let t = test_context();
    account(&t.ctx, "alice", false);
    let mut first = TestClient::login(&t.ctx, "alice").await;

    let mut second = TestClient::connect(&t.ctx);
    let login = ClientMessage::Login {
        username: "alice".into(),
        password: "pw".into(),
    };
    second.send(login.clone());
    assert_eq!(second.recv().await, ServerMessage::deny("the player has logged in"));

    first.close().await;
    second.send(login);
    second
        .expect(|m| matches!(m, ServerMessage::LoginSuccess { .. }))
        .await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_close_cleans_up_once() {
    let t = test_context();
    let player = account(&t.ctx, "alice", true);
    let mut client = TestClient::login(&t.ctx, "alice").await;

    let closers: Vec<_> = (0..2)
        .map(|i| {
            let handle = client.handle.clone();
            tokio::spawn(async move { handle.close(&format!("closer {i}")) })
        })
        .collect();
    for closer in closers {
        closer.await.unwrap();
    }
    client.join().await;

    let cleanups = t
        .log
        .events()
        .into_iter()
        .filter(|event| event.hook == Hook::Cleanup)
        .count();
    assert_eq!(cleanups, 1);
    assert!(t.ctx.hub.lookup(ClientId::from(player)).is_none());
    assert!(!t.ctx.areas.get(INITIAL_VILLAGE).unwrap().contains(player));
}

#[tokio::test]
async fn test_area_enter_move_and_chat() {
    let t = test_context();
    let alice_id = account(&t.ctx, "alice", false);
    let bob_id = account(&t.ctx, "bob", false);
    let mut alice = TestClient::login(&t.ctx, "alice").await;
    let mut bob = TestClient::login(&t.ctx, "bob").await;

    alice
        .expect(|m| matches!(m, ServerMessage::PlayerEnter { player, .. } if *player == bob_id))
        .await;
    // The newcomer first hears about the occupants, then its own arrival.
    assert!(matches!(bob.recv().await, ServerMessage::PlayerEnter { player, .. } if player == alice_id));
    assert!(matches!(bob.recv().await, ServerMessage::PlayerEnter { player, .. } if player == bob_id));

    bob.send(ClientMessage::Move {
        position: Vector2::new(3.0, 4.0),
    });
    alice
        .expect(|m| matches!(m, ServerMessage::PlayerMove { player, .. } if *player == bob_id))
        .await;

    bob.send(ClientMessage::Chat {
        channel: ChatChannel::Area,
        text: "hi".into(),
    });
    // No echo of the move, but an echo of the chat.
    assert!(matches!(bob.recv().await, ServerMessage::Chat { player, .. } if player == bob_id));
    alice
        .expect(|m| matches!(m, ServerMessage::Chat { text, .. } if text == "hi"))
        .await;
}

#[tokio::test]
async fn test_unknown_area_reports_failure() {
    let t = test_context();
    let alice_id = account(&t.ctx, "alice", false);
    let mut alice = TestClient::login(&t.ctx, "alice").await;
    alice.send(ClientMessage::EnterArea {
        area: "Nowhere".into(),
        entrance: 0,
    });
    let result = alice
        .expect(|m| matches!(m, ServerMessage::EnterAreaResult { .. }))
        .await;
    assert!(matches!(result, ServerMessage::EnterAreaResult { success: false, .. }));
    assert!(t.ctx.areas.get(INITIAL_VILLAGE).unwrap().contains(alice_id));
}

#[tokio::test]
async fn test_village_forbids_battle() {
    let t = test_context();
    account(&t.ctx, "alice", true);
    let bob_id = account(&t.ctx, "bob", true);
    let mut alice = TestClient::login(&t.ctx, "alice").await;
    let _bob = TestClient::login(&t.ctx, "bob").await;
    alice
        .expect(|m| matches!(m, ServerMessage::PlayerEnter { player, .. } if *player == bob_id))
        .await;

    alice.send(ClientMessage::BattleRequest { target: bob_id });
    assert_eq!(alice.recv().await, ServerMessage::deny("this area cannot battle"));
}

#[tokio::test]
async fn test_battle_disconnect_lets_other_side_win() {
    let t = test_context();
    let alice_id = account(&t.ctx, "alice", true);
    let bob_id = account(&t.ctx, "bob", true);
    let (mut alice, mut bob) = both_in_hub(&t.ctx, ("alice", alice_id), ("bob", bob_id)).await;

    alice.send(ClientMessage::BattleRequest { target: alice_id });
    assert_eq!(alice.recv().await, ServerMessage::deny("error request"));

    alice.send(ClientMessage::BattleRequest { target: bob_id });
    assert_eq!(alice.recv().await, ServerMessage::Ok);
    let invite = match bob
        .expect(|m| matches!(m, ServerMessage::BattleInvite { .. }))
        .await
    {
        ServerMessage::BattleInvite { invite, from, .. } => {
            assert_eq!(from, alice_id);
            invite
        }
        other => panic!("unexpected {other:?}"),
    };

    bob.send(ClientMessage::BattleResponse { invite, accept: true });
    bob.expect(|m| matches!(m, ServerMessage::StartBattle { slot: 1, .. }))
        .await;
    alice
        .expect(|m| matches!(m, ServerMessage::StartBattle { slot: 0, .. }))
        .await;
    alice
        .expect(|m| matches!(m, ServerMessage::Battle(BattleEvent::RoundStarted { round: 1 })))
        .await;
    assert!(t.ctx.battles.is_in_battle(alice_id));

    bob.send(ClientMessage::PetBagRequest);
    bob.expect(|m| matches!(m, ServerMessage::Deny { .. })).await;

    alice.close().await;
    bob.expect(|m| {
        matches!(
            m,
            ServerMessage::Battle(BattleEvent::Ended { winner: Some(1) })
        )
    })
    .await;
    bob.expect(|m| {
        matches!(
            m,
            ServerMessage::StateChanged {
                phase: SessionPhase::InGame
            }
        )
    })
    .await;
    match bob.recv().await {
        ServerMessage::PetBag { pets } => {
            let pet = pets[0].as_ref().unwrap();
            assert_eq!(pet.exp, 20);
            assert_eq!(pet.stats.hp, pet.stats.max_hp);
        }
        other => panic!("expected pet bag, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_expired_invite_is_denied() {
    let t = test_context();
    let alice_id = account(&t.ctx, "alice", true);
    let bob_id = account(&t.ctx, "bob", true);
    let (alice, mut bob) = both_in_hub(&t.ctx, ("alice", alice_id), ("bob", bob_id)).await;

    alice.send(ClientMessage::BattleRequest { target: bob_id });
    let invite = match bob
        .expect(|m| matches!(m, ServerMessage::BattleInvite { .. }))
        .await
    {
        ServerMessage::BattleInvite { invite, .. } => invite,
        other => panic!("unexpected {other:?}"),
    };

    let board = t.ctx.areas.get(ADVENTURE_HUB).unwrap().invites().cloned().unwrap();
    assert_eq!(board.len(), 1);
    tokio::time::sleep(Duration::from_secs(16)).await;
    assert!(board.is_empty());

    bob.send(ClientMessage::BattleResponse { invite, accept: true });
    assert_eq!(
        bob.expect(|m| matches!(m, ServerMessage::Deny { .. })).await,
        ServerMessage::deny("battle invite expired or not found")
    );
    assert!(!t.ctx.battles.is_in_battle(bob_id));
}

#[tokio::test]
async fn test_welcome_mail_starter_and_exp_item() {
    let t = test_context();
    let mut client = TestClient::connect(&t.ctx);
    let credentials = |register: bool| {
        let (username, password) = ("carol".to_string(), "pw".to_string());
        if register {
            ClientMessage::Register { username, password }
        } else {
            ClientMessage::Login { username, password }
        }
    };
    client.send(credentials(true));
    assert_eq!(client.recv().await, ServerMessage::Ok);
    client.send(credentials(true));
    assert_eq!(client.recv().await, ServerMessage::deny("the username has already existed"));

    client.send(credentials(false));
    let player = match client
        .expect(|m| matches!(m, ServerMessage::LoginSuccess { .. }))
        .await
    {
        ServerMessage::LoginSuccess { player, .. } => player,
        other => panic!("unexpected {other:?}"),
    };

    client.send(ClientMessage::MailList);
    let mails = match client
        .expect(|m| matches!(m, ServerMessage::MailList { .. }))
        .await
    {
        ServerMessage::MailList { mails } => mails,
        other => panic!("unexpected {other:?}"),
    };
    assert_eq!(mails.len(), 2);
    let reward = mails.iter().find(|mail| !mail.items.is_empty()).unwrap().id;

    client.send(ClientMessage::MailCollect { mail: reward });
    assert_eq!(
        client.expect(|m| matches!(m, ServerMessage::BagChanged { .. })).await,
        ServerMessage::BagChanged {
            bag: BagKind::Items,
            item: INITIAL_PET,
            count: 1
        }
    );
    assert_eq!(
        client.recv().await,
        ServerMessage::BagChanged {
            bag: BagKind::PetItems,
            item: ORANGE_SUGAR,
            count: 2
        }
    );
    assert_eq!(client.recv().await, ServerMessage::MailDeleted { mail: reward });

    client.send(ClientMessage::ChooseStarter { kind: BURO });
    assert_eq!(
        client.recv().await,
        ServerMessage::BagChanged {
            bag: BagKind::Items,
            item: INITIAL_PET,
            count: 0
        }
    );
    assert!(matches!(
        client.recv().await,
        ServerMessage::GetPet { equipped: true, .. }
    ));

    client.send(ClientMessage::ChooseStarter { kind: BURO });
    assert!(matches!(client.recv().await, ServerMessage::Deny { .. }));

    client.send(ClientMessage::UsePetItem {
        item: ORANGE_SUGAR,
        slot: 0,
        count: 1,
    });
    assert_eq!(
        client.recv().await,
        ServerMessage::BagChanged {
            bag: BagKind::PetItems,
            item: ORANGE_SUGAR,
            count: 1
        }
    );
    match client.recv().await {
        ServerMessage::PetUpdated { slot: 0, pet } => assert_eq!(pet.level, 4),
        other => panic!("unexpected {other:?}"),
    }

    let stored = t.ctx.stores.pets.load_equipped(player).unwrap();
    assert_eq!(stored[0].as_ref().unwrap().level, 4);
}

#[tokio::test]
async fn test_healer_restores_pets() {
    let t = test_context();
    let player = account(&t.ctx, "alice", true);
    let mut pets = t.ctx.stores.pets.load_equipped(player).unwrap();
    let pet = pets[0].as_mut().unwrap();
    pet.stats.hp = 1;
    t.ctx.stores.pets.save_pet(player, pet).unwrap();

    let mut alice = TestClient::login(&t.ctx, "alice").await;
    alice.send(ClientMessage::NpcAction {
        action: NpcAction::Heal,
    });
    assert_eq!(
        alice.expect(|m| matches!(m, ServerMessage::Deny { .. })).await,
        ServerMessage::deny("talk to an npc first")
    );

    alice.send(ClientMessage::InteractNpc { npc: NpcId(2) });
    assert_eq!(
        alice.recv().await,
        ServerMessage::OpenUi {
            path: "healer".into()
        }
    );
    alice.send(ClientMessage::NpcAction {
        action: NpcAction::Heal,
    });
    match alice.recv().await {
        ServerMessage::PetBag { pets } => {
            let pet = pets[0].as_ref().unwrap();
            assert_eq!(pet.stats.hp, pet.stats.max_hp);
        }
        other => panic!("unexpected {other:?}"),
    }
    let stored = t.ctx.stores.pets.load_equipped(player).unwrap();
    assert_eq!(stored[0].as_ref().unwrap().stats.hp, 50);
}

#[test]
fn test_full_outbound_queue_drops_without_waiting() {
    let (handle, _inbox, mut outbound) = detached_handle_with_outbound(1);
    assert!(handle.socket_send(ServerMessage::deny("first")));
    assert!(!handle.socket_send(ServerMessage::deny("second")));

    let queued = outbound.try_recv().unwrap();
    assert_eq!(queued.sender, ClientId::SERVER);
    assert_eq!(queued.message, ServerMessage::deny("first"));
    assert!(outbound.try_recv().is_err());

    // Room again once the writer caught up.
    assert!(handle.socket_send(ServerMessage::deny("third")));
    handle.close("test");
    assert!(!handle.socket_send(ServerMessage::deny("fourth")));
}

#[test]
fn test_control_messages_bypass_full_inbox() {
    let mut session = detached(1);
    let handle = &session.handle;
    handle.process_message(ClientId::SERVER, SessionMessage::SavePets).unwrap();
    assert_eq!(
        handle.process_message(ClientId::SERVER, SessionMessage::SavePets),
        Err(DeliveryError::Full)
    );
    for _ in 0..3 {
        handle.process_control(ClientId::SERVER, SessionMessage::SavePets).unwrap();
    }
    for _ in 0..3 {
        assert!(session.control.try_recv().is_ok());
    }

    handle.close("test");
    assert_eq!(
        handle.process_control(ClientId::SERVER, SessionMessage::SavePets),
        Err(DeliveryError::Closed)
    );
}
