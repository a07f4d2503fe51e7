//! End-to-end tests driving a Warden through its dispatcher

mod common;

use common::WardenTest;
use warden::commands::dispatcher::{DENIED_MESSAGE, FAILED_MESSAGE, IN_GAME_ONLY_MESSAGE};
use warden::commands::{Command, CommandContext, CommandHandler, DispatchOutcome};
use warden::groups::Principal;
use warden::permissions::{CAN_BUILD, CAN_LOGIN};
use warden::regions::Rect;
use warden::restrictions::{IdentifierKind, RestrictionClass};
use warden::Error;

#[tokio::test]
async fn test_register_then_login() {
    let t = WardenTest::start().await.expect("Failed to start warden");
    let mut alice = t.guest("alice", "dev-a", "10.1.0.1").await.unwrap();

    let (outcome, texts) = t.run(&mut alice, "/register ab").await;
    assert_eq!(outcome, DispatchOutcome::Executed(1));
    assert_eq!(
        texts,
        vec!["Password must be greater than or equal to 4 characters."]
    );
    let short = t
        .warden
        .services()
        .accounts
        .register("alice", "ab", "")
        .await;
    assert!(matches!(short, Err(Error::InvalidArgument(_))));

    let reply = t.last(&mut alice, "/register s3cret!").await;
    assert_eq!(reply, "Type /login <password> to log-in to your account.");

    let services = t.warden.services();
    let account = services.accounts.get_by_name("alice").await.unwrap().unwrap();
    assert_eq!(account.primary_group(), Some("default"));
    let principal = account.principal(&services.settings.get());
    assert!(services.groups.has_permission(&principal, CAN_LOGIN).await.unwrap());

    let reply = t.last(&mut alice, "/login wrong").await;
    assert_eq!(reply, "Invalid password.");
    let reply = t.last(&mut alice, "/login s3cret!").await;
    assert_eq!(reply, "Authenticated as alice successfully.");
    assert_eq!(alice.account_name(), Some("alice"));

    let reply = t.last(&mut alice, "/login s3cret!").await;
    assert_eq!(reply, "You are already logged in, and cannot login again.");

    let reply = t.last(&mut alice, "/logout").await;
    assert_eq!(reply, "You have been successfully logged out of your account.");
    assert!(!alice.is_logged_in());
}

#[tokio::test]
async fn test_quoted_arguments_reach_handlers() {
    let t = WardenTest::start().await.unwrap();
    let mut console = t.console();

    let reply = t.last(&mut console, r#"/region define "town hall" 0 0 8 8"#).await;
    assert_eq!(reply, "Set region town hall at (0, 0) 8x8.");
    assert!(t.warden.services().regions.get("town hall").await.unwrap().is_some());

    // Spaces inside a name are rejected once they reach the group graph
    let (outcome, texts) = t.run(&mut console, r#"/group add "build crew""#).await;
    assert_eq!(outcome, DispatchOutcome::Executed(1));
    assert_eq!(texts, vec!["Invalid group name \"build crew\""]);

    let (outcome, _) = t.run(&mut console, "just chatting").await;
    assert_eq!(outcome, DispatchOutcome::NotACommand);
}

#[tokio::test]
async fn test_overlapping_regions_use_highest_z() {
    let t = WardenTest::start().await.unwrap();
    let services = t.warden.services();
    let mut console = t.console();
    let mut p1 = t.player("p1", "password1").await.unwrap();
    let p2 = t.player("p2", "password2").await.unwrap();

    t.run(&mut console, "/region define low 0 0 20 20 0").await;
    t.run(&mut console, "/region define high 5 5 5 5 1").await;
    t.run(&mut console, "/region allow p1 high").await;

    // Inside the overlap only the higher region's allow-list counts
    assert!(t.warden.can_act(&p1, 6, 6, CAN_BUILD).await.unwrap());
    assert!(!t.warden.can_act(&p2, 6, 6, CAN_BUILD).await.unwrap());
    assert!(!t.warden.can_act(&p1, 1, 1, CAN_BUILD).await.unwrap());

    // Right and bottom edges are inclusive
    assert!(t.warden.can_act(&p1, 10, 10, CAN_BUILD).await.unwrap());
    assert!(!t.warden.can_act(&p1, 11, 10, CAN_BUILD).await.unwrap());
    assert!(t.warden.can_act(&p2, 21, 21, CAN_BUILD).await.unwrap());

    let top = services.regions.top_region(6, 6).await.unwrap().unwrap();
    assert_eq!(top.name, "high");

    p1.position = Some((6, 6));
    let reply = t.last(&mut p1, "/region here").await;
    assert_eq!(reply, DENIED_MESSAGE);

    services
        .regions
        .create("outside", Rect::new(100, 100, 1, 1).unwrap(), "p2", 0)
        .await
        .unwrap();
    assert!(t.warden.can_act(&p2, 100, 100, CAN_BUILD).await.unwrap());
}

#[tokio::test]
async fn test_restrictions_by_name_and_address() {
    let t = WardenTest::start().await.unwrap();
    let services = t.warden.services();
    let mut console = t.console();
    services.accounts.register("mallory", "password1", "").await.unwrap();

    // Offline account ban by name
    let reply = t.last(&mut console, "/ban add account mallory cheating").await;
    assert!(reply.contains("mallory"), "{}", reply);

    let mut session = t.guest("mallory", "dev-m", "10.2.0.1").await.unwrap();
    let refused = t.warden.login(&mut session, "mallory", "password1").await;
    match refused {
        Err(Error::Unauthorized(notice)) => assert!(notice.contains("You are banned: cheating")),
        other => panic!("expected a ban notice, got {:?}", other),
    }

    // Address ban refuses any session from that address
    services
        .restrictions
        .add(
            RestrictionClass::Ban,
            IdentifierKind::IpAddress,
            "10.2.0.7",
            "flooding",
            "Server",
            None,
        )
        .await
        .unwrap();
    let other = t.warden.player("eve", Some("dev-e"), Some("10.2.0.7"));
    assert!(matches!(
        t.warden.connect(&other).await,
        Err(Error::Unauthorized(_))
    ));
    let elsewhere = t.warden.player("eve", Some("dev-e"), Some("10.2.0.8"));
    assert!(t.warden.connect(&elsewhere).await.is_ok());

    let (_, texts) = t.run(&mut console, "/ban list").await;
    assert!(texts.iter().any(|l| l.contains("flooding")));
    assert_eq!(services.restrictions.count(RestrictionClass::Ban).await.unwrap(), 2);
}

#[tokio::test]
async fn test_group_cycle_is_rejected() {
    let t = WardenTest::start().await.unwrap();
    let groups = &t.warden.services().groups;
    groups.create("a", None, &[]).await.unwrap();
    groups.create("b", Some("a"), &[]).await.unwrap();

    let result = groups.set_parent("a", Some("b")).await;
    assert!(matches!(result, Err(Error::CyclicReference(_))));

    let principal = Principal::new(vec!["b".to_string()], Vec::new());
    assert!(!groups.has_permission(&principal, "anything").await.unwrap());
}

#[tokio::test]
async fn test_denied_and_console_only_paths() {
    let t = WardenTest::start().await.unwrap();
    let mut guest = t.guest("wanderer", "dev-w", "10.3.0.1").await.unwrap();
    let mut console = t.console();

    let (outcome, texts) = t.run(&mut guest, "/group list").await;
    assert_eq!(outcome, DispatchOutcome::Denied);
    assert_eq!(texts, vec![DENIED_MESSAGE]);

    let (outcome, texts) = t.run(&mut console, "/login secret").await;
    assert_eq!(outcome, DispatchOutcome::Denied);
    assert_eq!(texts, vec![IN_GAME_ONLY_MESSAGE]);

    // Granting the permission takes effect on the next command
    let mut staff = t.player("staff", "password1").await.unwrap();
    let (outcome, _) = t.run(&mut staff, "/group list").await;
    assert_eq!(outcome, DispatchOutcome::Denied);
    t.run(&mut console, "/user group staff admin").await;
    let (outcome, _) = t.run(&mut staff, "/group list").await;
    assert_eq!(outcome, DispatchOutcome::Executed(1));
}

#[tokio::test]
async fn test_awaiting_response_consumes_one_line() {
    let t = WardenTest::start().await.unwrap();
    let mut guest = t.guest("pat", "dev-p", "10.4.0.1").await.unwrap();

    guest.await_response(
        "accept",
        Box::new(|actor, _| actor.send_success("Trade accepted.")),
    );
    let (outcome, texts) = t.run(&mut guest, "/accept").await;
    assert_eq!(outcome, DispatchOutcome::Responded);
    assert_eq!(texts, vec!["Trade accepted."]);

    let (outcome, _) = t.run(&mut guest, "/accept").await;
    assert_eq!(outcome, DispatchOutcome::Unknown);
}

struct Explodes;

#[async_trait::async_trait]
impl CommandHandler for Explodes {
    async fn execute(&self, _ctx: &mut CommandContext<'_>) -> warden::Result<()> {
        panic!("host command bug");
    }
}

#[tokio::test]
async fn test_host_command_panic_is_contained() {
    let mut t = WardenTest::start().await.unwrap();
    t.warden
        .commands_mut()
        .register(Command::new(&["explode"], Explodes).help("Misbehaves."));
    let mut guest = t.guest("sam", "dev-s", "10.5.0.1").await.unwrap();

    let (outcome, texts) = t.run(&mut guest, "/explode").await;
    assert_eq!(outcome, DispatchOutcome::Executed(1));
    assert_eq!(texts, vec![FAILED_MESSAGE]);

    // The dispatcher keeps working afterwards
    let (outcome, _) = t.run(&mut guest, "/help").await;
    assert_eq!(outcome, DispatchOutcome::Executed(1));
}

#[tokio::test]
async fn test_config_survives_restart() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = warden::Config {
        db_path: Some(dir.path().join("warden.db")),
        ..Default::default()
    };

    {
        let warden = warden::Warden::new(config.clone()).await.unwrap();
        let mut console = warden.console();
        warden
            .dispatch(&mut console, "/config set minimum_password_length 8")
            .await;
    }

    let warden = warden::Warden::new(config).await.unwrap();
    let length = warden
        .services()
        .settings
        .read(|s| s.minimum_password_length);
    assert_eq!(length, 8);
}
