use pacekeeper::{
    AdmissionGate, CommandSpec, ConversationContext, Denial, GroupMember, ManualClock,
    OwnerListResolver, PermissionResolver, PrivilegeLevel, Verdict,
};
use std::time::Duration;

fn gate(clock: &ManualClock) -> AdmissionGate {
    AdmissionGate::new(OwnerListResolver::new(["owner"])).with_clock(clock.clone())
}

#[test]
fn owner_command_denied_below_owner_regardless_of_cooldown() {
    let clock = ManualClock::starting_at(1_000_000);
    let gate = gate(&clock);
    let spec = CommandSpec::new("eval").required_level(PrivilegeLevel::Owner).cool_down_secs(0);

    for level in [PrivilegeLevel::Member, PrivilegeLevel::GroupModerator] {
        for _ in 0..3 {
            let verdict = gate.authorize("u1", &spec, level);
            assert_eq!(
                verdict,
                Verdict::Denied(Denial::InsufficientPrivilege {
                    required: PrivilegeLevel::Owner,
                    actual: level,
                })
            );
            clock.advance(60_000);
        }
    }
    // Denials never touch the cooldown table.
    assert!(gate.cooldowns().is_empty());
    assert!(gate.authorize("owner", &spec, PrivilegeLevel::Owner).is_accepted());
}

#[test]
fn five_second_cooldown_boundary() {
    let clock = ManualClock::starting_at(10_000);
    let gate = gate(&clock);
    let spec = CommandSpec::new("daily").cool_down(Duration::from_secs(5));

    assert!(gate.authorize("u1", &spec, PrivilegeLevel::Member).is_accepted());
    clock.advance(4_999);
    let denied = gate.authorize("u1", &spec, PrivilegeLevel::Member);
    assert_eq!(denied, Verdict::Denied(Denial::OnCooldown { remaining: Duration::from_millis(1) }));
    clock.advance(1);
    assert!(gate.authorize("u1", &spec, PrivilegeLevel::Member).is_accepted());
}

#[test]
fn cooldowns_are_per_caller_and_per_command() {
    let clock = ManualClock::starting_at(0);
    let gate = gate(&clock);
    let daily = CommandSpec::new("daily").cool_down_secs(60);
    let work = CommandSpec::new("work").cool_down_secs(60);

    assert!(gate.authorize("u1", &daily, PrivilegeLevel::Member).is_accepted());
    assert!(gate.authorize("u2", &daily, PrivilegeLevel::Member).is_accepted());
    assert!(gate.authorize("u1", &work, PrivilegeLevel::Member).is_accepted());
    assert!(!gate.authorize("u1", &daily, PrivilegeLevel::Member).is_accepted());
    assert_eq!(gate.cooldowns().len(), 3);
}

#[test]
fn denied_retry_does_not_extend_cooldown() {
    let clock = ManualClock::starting_at(0);
    let gate = gate(&clock);
    let spec = CommandSpec::new("daily").cool_down_secs(10);

    assert!(gate.authorize("u1", &spec, PrivilegeLevel::Member).is_accepted());
    clock.advance(9_000);
    assert!(!gate.authorize("u1", &spec, PrivilegeLevel::Member).is_accepted());
    clock.advance(1_000);
    assert!(gate.authorize("u1", &spec, PrivilegeLevel::Member).is_accepted());
}

#[test]
fn admit_resolves_group_moderators() {
    let clock = ManualClock::new();
    let gate = gate(&clock);
    let spec = CommandSpec::new("kick").required_level(PrivilegeLevel::GroupModerator);
    let group = ConversationContext::group([GroupMember::moderator("mod"), GroupMember::new("pleb")]);

    assert!(gate.admit("mod", &group, &spec).is_accepted());
    assert!(gate.admit("owner", &ConversationContext::Direct, &spec).is_accepted());
    let denied = gate.admit("pleb", &group, &spec).into_result().unwrap_err();
    assert!(denied.is_privilege());
    assert_eq!(denied.to_string(), "You need Group Admin permission to use this command.");
}

#[test]
fn cooldown_message_shows_one_decimal() {
    let denial = Denial::OnCooldown { remaining: Duration::from_millis(2_340) };
    assert_eq!(denial.to_string(), "Please wait 2.3 seconds before using this command again.");
    assert_eq!(denial.remaining(), Some(Duration::from_millis(2_340)));
    assert!(denial.is_cooldown());
}

#[test]
fn custom_resolver_plugs_into_gate() {
    struct EveryoneIsOwner;
    impl PermissionResolver for EveryoneIsOwner {
        fn resolve(&self, _caller: &str, _context: &ConversationContext) -> PrivilegeLevel {
            PrivilegeLevel::Owner
        }
    }

    let gate = AdmissionGate::new(EveryoneIsOwner);
    let spec = CommandSpec::new("shutdown").required_level(PrivilegeLevel::Owner);
    assert!(gate.admit("anyone", &ConversationContext::Direct, &spec).is_accepted());
}

#[test]
fn command_spec_reads_declaration_json() {
    let spec: CommandSpec = serde_json::from_str(
        r#"{ "name": "daily", "aliases": ["claim"], "role": 1, "coolDown": 2.5, "description": "Daily coins" }"#,
    )
    .unwrap();
    assert_eq!(spec.required_level, PrivilegeLevel::GroupModerator);
    assert_eq!(spec.cool_down, Duration::from_millis(2_500));
    assert_eq!(spec.aliases, vec!["claim".to_string()]);

    let bad = serde_json::from_str::<CommandSpec>(r#"{ "name": "x", "role": 7 }"#);
    assert!(bad.is_err());
}
