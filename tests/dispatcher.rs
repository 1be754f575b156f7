mod common;

use async_trait::async_trait;
use common::{virtual_outbox, RecordingTransport};
use pacekeeper::command::DuplicateCommand;
use pacekeeper::{
    AdmissionGate, CommandDispatcher, CommandHandler, CommandSpec, ConversationContext, Denial,
    DispatcherConfig, GroupMember, HandlerError, HelpCommand, InboundMessage, Invocation,
    ManualClock, MemoryStore, Outbox, Outcome, OwnerListResolver, PrefixCommand, PrivilegeLevel,
    TransportError, UserStore,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct Echo {
    spec: CommandSpec,
}

impl Echo {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            spec: CommandSpec::new("echo").alias("say").cool_down_secs(5).description("Repeat text"),
        })
    }
}

#[async_trait]
impl CommandHandler for Echo {
    fn spec(&self) -> &CommandSpec {
        &self.spec
    }

    async fn run(&self, invocation: &Invocation) -> Result<(), HandlerError> {
        invocation.reply(invocation.args.join(" ")).await?;
        Ok(())
    }
}

struct Failing {
    spec: CommandSpec,
    error: fn() -> HandlerError,
}

#[async_trait]
impl CommandHandler for Failing {
    fn spec(&self) -> &CommandSpec {
        &self.spec
    }

    async fn run(&self, _invocation: &Invocation) -> Result<(), HandlerError> {
        Err((self.error)())
    }
}

struct Shutdown {
    spec: CommandSpec,
}

#[async_trait]
impl CommandHandler for Shutdown {
    fn spec(&self) -> &CommandSpec {
        &self.spec
    }

    async fn run(&self, invocation: &Invocation) -> Result<(), HandlerError> {
        invocation.reply("bye").await?;
        Ok(())
    }
}

#[derive(Default)]
struct ChatCounter {
    spec: Option<CommandSpec>,
    seen: AtomicUsize,
}

#[async_trait]
impl CommandHandler for ChatCounter {
    fn spec(&self) -> &CommandSpec {
        self.spec.as_ref().expect("spec set in fixture")
    }

    async fn run(&self, _invocation: &Invocation) -> Result<(), HandlerError> {
        Ok(())
    }

    async fn on_chat(&self, _message: &InboundMessage, _outbox: &Outbox) -> Result<(), HandlerError> {
        self.seen.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct Fixture {
    dispatcher: CommandDispatcher,
    transport: Arc<RecordingTransport>,
    clock: ManualClock,
    store: MemoryStore,
    chat: Arc<ChatCounter>,
}

fn fixture_with(config: DispatcherConfig) -> Fixture {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let transport = RecordingTransport::new();
    let outbox = virtual_outbox(transport.clone());
    let clock = ManualClock::starting_at(1_000_000);
    let store = MemoryStore::new().with_clock(clock.clone());
    let gate = AdmissionGate::new(OwnerListResolver::new(config.owners.iter().cloned()))
        .with_clock(clock.clone());

    let mut dispatcher = CommandDispatcher::new(config.clone(), outbox)
        .with_gate(gate)
        .with_store(Arc::new(store.clone()))
        .with_clock(clock.clone());

    let prefix = PrefixCommand::new(dispatcher.prefixes().clone(), config.prefix.clone());
    let chat = Arc::new(ChatCounter { spec: Some(CommandSpec::new("stats")), ..Default::default() });
    dispatcher.register(Echo::new()).unwrap();
    dispatcher.register(Arc::new(HelpCommand::new())).unwrap();
    dispatcher.register(Arc::new(prefix)).unwrap();
    dispatcher.register(chat.clone()).unwrap();
    dispatcher
        .register(Arc::new(Shutdown {
            spec: CommandSpec::new("shutdown").required_level(PrivilegeLevel::Owner),
        }))
        .unwrap();
    dispatcher
        .register(Arc::new(Failing {
            spec: CommandSpec::new("broken"),
            error: || HandlerError::failed("database offline"),
        }))
        .unwrap();
    dispatcher
        .register(Arc::new(Failing {
            spec: CommandSpec::new("flood"),
            error: || TransportError::with_status(429, "rate-overlimit").into(),
        }))
        .unwrap();

    Fixture { dispatcher, transport, clock, store, chat }
}

fn fixture() -> Fixture {
    fixture_with(DispatcherConfig {
        prefix: "!".into(),
        owners: vec!["owner".into()],
        notify_unknown_command: true,
    })
}

fn group(mods: &[&str], members: &[&str]) -> ConversationContext {
    ConversationContext::group(
        mods.iter()
            .map(|id| GroupMember::moderator(*id))
            .chain(members.iter().map(|id| GroupMember::new(*id))),
    )
}

#[tokio::test]
async fn runs_command_with_whitespace_split_args() {
    let f = fixture();
    let outcome = f.dispatcher.handle(InboundMessage::direct("u1", "!echo hello   big  world")).await;

    assert_eq!(outcome, Outcome::Executed { command: "echo".into() });
    assert_eq!(f.transport.sent(), vec![("u1".to_string(), "hello big world".to_string())]);
}

#[tokio::test]
async fn name_is_case_insensitive_and_aliases_resolve() {
    let f = fixture();
    let outcome = f.dispatcher.handle(InboundMessage::direct("u1", "!SAY hi")).await;
    assert_eq!(outcome, Outcome::Executed { command: "echo".into() });
    assert_eq!(f.transport.texts(), vec!["hi"]);
}

#[tokio::test]
async fn unknown_command_gets_notice() {
    let f = fixture();
    let outcome = f.dispatcher.handle(InboundMessage::direct("u1", "!nope")).await;

    assert_eq!(outcome, Outcome::UnknownCommand { name: "nope".into() });
    assert_eq!(
        f.transport.texts(),
        vec!["The command \"nope\" does not exist, type !help to see all available commands"]
    );
}

#[tokio::test]
async fn unknown_command_notice_can_be_disabled() {
    let f = fixture_with(DispatcherConfig { notify_unknown_command: false, ..DispatcherConfig::default() });
    let outcome = f.dispatcher.handle(InboundMessage::direct("u1", "!nope")).await;

    assert_eq!(outcome, Outcome::UnknownCommand { name: "nope".into() });
    assert!(f.transport.sent().is_empty());
}

#[tokio::test]
async fn insufficient_privilege_is_replied_and_handler_skipped() {
    let f = fixture();
    let outcome = f.dispatcher.handle(InboundMessage::direct("u1", "!shutdown")).await;

    assert!(matches!(outcome, Outcome::Denied { ref denial, .. } if denial.is_privilege()));
    assert_eq!(f.transport.texts(), vec!["You need Bot Owner permission to use this command."]);

    let outcome = f.dispatcher.handle(InboundMessage::direct("owner", "!shutdown")).await;
    assert_eq!(outcome, Outcome::Executed { command: "shutdown".into() });
}

#[tokio::test]
async fn cooldown_is_shared_by_aliases_and_expires() {
    let f = fixture();
    assert!(matches!(
        f.dispatcher.handle(InboundMessage::direct("u1", "!echo a")).await,
        Outcome::Executed { .. }
    ));

    f.clock.advance(1_000);
    let outcome = f.dispatcher.handle(InboundMessage::direct("u1", "!say b")).await;
    assert_eq!(
        outcome,
        Outcome::Denied {
            command: "echo".into(),
            denial: Denial::OnCooldown { remaining: Duration::from_secs(4) },
        }
    );
    assert_eq!(
        f.transport.texts().last().map(String::as_str),
        Some("Please wait 4.0 seconds before using this command again.")
    );

    // Another caller is unaffected.
    assert!(matches!(
        f.dispatcher.handle(InboundMessage::direct("u2", "!echo c")).await,
        Outcome::Executed { .. }
    ));

    f.clock.advance(4_000);
    assert!(matches!(
        f.dispatcher.handle(InboundMessage::direct("u1", "!echo d")).await,
        Outcome::Executed { .. }
    ));
}

#[tokio::test]
async fn handler_failures_are_classified() {
    let f = fixture();
    let outcome = f.dispatcher.handle(InboundMessage::direct("u1", "!broken")).await;
    assert_eq!(outcome, Outcome::Failed { command: "broken".into(), throttled: false });

    let outcome = f.dispatcher.handle(InboundMessage::direct("u1", "!flood")).await;
    assert_eq!(outcome, Outcome::Failed { command: "flood".into(), throttled: true });

    assert_eq!(
        f.transport.texts(),
        vec![
            "An error occurred while processing your command.",
            "Too many requests. Your command will be processed shortly...",
        ]
    );
}

#[tokio::test]
async fn successful_commands_are_tracked_in_store() {
    let f = fixture();
    let msg = InboundMessage::direct("u1", "!echo hi").with_sender_name("Ann");
    f.dispatcher.handle(msg).await;
    f.clock.advance(10_000);
    f.dispatcher.handle(InboundMessage::direct("u1", "!broken")).await;
    f.dispatcher.handle(InboundMessage::direct("u1", "!shutdown")).await;

    let user = f.store.get_user("u1", None).await.unwrap();
    assert_eq!(user.command_count, 1);
    assert_eq!(user.name, "Ann");
    assert_eq!(user.last_active, 1_000_000);
}

#[tokio::test]
async fn plain_messages_reach_on_chat_hooks() {
    let f = fixture();
    let outcome = f.dispatcher.handle(InboundMessage::direct("u1", "good morning")).await;

    assert_eq!(outcome, Outcome::Chat);
    assert_eq!(f.chat.seen.load(Ordering::SeqCst), 1);
    assert!(f.transport.sent().is_empty());
}

#[tokio::test]
async fn bare_prefix_is_ignored() {
    let f = fixture();
    assert_eq!(f.dispatcher.handle(InboundMessage::direct("u1", "!")).await, Outcome::Ignored);
    assert_eq!(f.dispatcher.handle(InboundMessage::direct("u1", "!   ")).await, Outcome::Ignored);
    assert!(f.transport.sent().is_empty());
}

#[tokio::test]
async fn special_words_skip_prefix_and_cooldown() {
    let f = fixture();
    for _ in 0..2 {
        let outcome = f.dispatcher.handle(InboundMessage::direct("u1", "prefix")).await;
        assert_eq!(outcome, Outcome::Executed { command: "prefix".into() });
    }
    assert_eq!(f.transport.texts(), vec!["Global prefix: !\nChat prefix: !"; 2]);

    let outcome = f.dispatcher.handle(InboundMessage::direct("u1", "Commands")).await;
    assert_eq!(outcome, Outcome::Executed { command: "help".into() });
    let listing = f.transport.texts().pop().unwrap();
    assert!(listing.starts_with("Available commands:"));
    assert!(listing.contains("\n!echo - Repeat text"));
    assert!(!listing.contains("!shutdown"), "owner-only commands are hidden: {listing}");
}

#[tokio::test]
async fn help_describes_one_command() {
    let f = fixture();
    f.dispatcher.handle(InboundMessage::direct("u1", "!help say")).await;
    let text = f.transport.texts().pop().unwrap();
    assert!(text.starts_with("!echo\nRepeat text"));
    assert!(text.contains("Aliases: say"));
    assert!(text.contains("Cooldown: 5s"));
}

#[tokio::test]
async fn moderators_override_prefix_per_conversation() {
    let f = fixture();
    let ctx = group(&["mod"], &["pleb"]);

    let denied = f
        .dispatcher
        .handle(InboundMessage::in_group("g1", "pleb", "!prefix #", ctx.clone()))
        .await;
    assert_eq!(denied, Outcome::Executed { command: "prefix".into() });
    assert_eq!(f.dispatcher.effective_prefix("g1"), "!");

    f.dispatcher.handle(InboundMessage::in_group("g1", "mod", "!prefix #", ctx.clone())).await;
    assert_eq!(f.dispatcher.effective_prefix("g1"), "#");
    assert_eq!(f.dispatcher.effective_prefix("g2"), "!");

    let outcome =
        f.dispatcher.handle(InboundMessage::in_group("g1", "pleb", "#echo hey", ctx.clone())).await;
    assert_eq!(outcome, Outcome::Executed { command: "echo".into() });
    let outcome =
        f.dispatcher.handle(InboundMessage::in_group("g1", "pleb", "!echo hey", ctx.clone())).await;
    assert_eq!(outcome, Outcome::Chat);

    let texts = f.transport.texts();
    assert_eq!(texts[0], "You need Group Admin permission to use this command.");
    assert_eq!(texts[1], "Prefix changed to #");
    assert!(f.transport.sent().iter().all(|(chat, _)| chat == "g1"));

    f.clock.advance(5_000);
    f.dispatcher.handle(InboundMessage::in_group("g1", "mod", "#prefix reset", ctx)).await;
    assert_eq!(f.dispatcher.effective_prefix("g1"), "!");
}

#[tokio::test]
async fn duplicate_names_and_aliases_are_rejected() {
    let mut f = fixture();
    let err = f.dispatcher.register(Echo::new()).unwrap_err();
    assert_eq!(err, DuplicateCommand("echo".into()));

    let clash = Arc::new(Shutdown { spec: CommandSpec::new("repeat").alias("SAY") });
    assert_eq!(f.dispatcher.register(clash).unwrap_err(), DuplicateCommand("say".into()));
    assert!(f.dispatcher.catalog().iter().all(|s| s.name != "repeat"));
}
