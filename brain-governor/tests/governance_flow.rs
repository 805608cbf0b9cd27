use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use brain_governor::config::{load_manifest, GovernorConfig};
use brain_governor::kernel::{
    ApprovalNotifier, ApprovalTicket, Governor, GovernorError, ManifestRegistry, ManifestState,
};
use brain_governor::policy::{ActorContext, DecisionRequest, ReasonCode};
use brain_governor::primitives::GovernorMode;
use serde_json::json;
use tempfile::NamedTempFile;
use tokio::sync::mpsc;

const MANIFEST: &str = r#"{
    "version": "2026.10.1",
    "description": "fleet operations",
    "risk_classes": [
        {"name": "routine", "tier": "low"},
        {"name": "fleet", "tier": "high", "budget": "dispatches"},
        {"name": "safety", "tier": "critical"}
    ],
    "budgets": [
        {"id": "dispatches", "tier": "high", "limit": {"kind": "count", "max": 2}, "window_ms": 3600000},
        {"id": "mission-time", "tier": "high", "limit": {"kind": "time", "limit_ms": 200}, "grace_period_ms": 100}
    ],
    "base_constraints": {
        "limits": {"max_robots": 10, "max_speed_cm_s": 120},
        "flags": {"network_access": true},
        "sets": {"tools": ["camera", "gripper", "lidar"]}
    },
    "rules": [
        {
            "id": "deny-guests",
            "priority": 100,
            "when": {"field": {"path": "actor.role", "op": "eq", "value": "guest"}},
            "action": "deny",
            "risk_class": "safety"
        },
        {
            "id": "dispatch",
            "priority": 10,
            "when": {"field": {"path": "action", "op": "eq", "value": "mission.dispatch"}},
            "action": "allow",
            "risk_class": "fleet",
            "reductions": [
                {"op": "cap_limit", "key": "max_robots", "max": 4},
                {"op": "restrict", "set": "tools", "allowed": ["camera", "lidar"]}
            ]
        },
        {
            "id": "night-ops",
            "when": {"all": [
                {"field": {"path": "action", "op": "eq", "value": "mission.dispatch"}},
                {"field": {"path": "request.metadata.night", "op": "eq", "value": true}}
            ]},
            "action": "allow",
            "risk_class": "routine",
            "reductions": [{"op": "scale_limit", "key": "max_speed_cm_s", "percent": 50}]
        },
        {
            "id": "mission-run",
            "when": {"field": {"path": "action", "op": "eq", "value": "mission.run"}},
            "action": "allow",
            "risk_class": "routine",
            "budget": "mission-time"
        },
        {
            "id": "safety-override",
            "when": {"field": {"path": "action", "op": "starts_with", "value": "safety."}},
            "action": "escalate",
            "risk_class": "safety",
            "approvers": ["safety-officer"]
        }
    ],
    "default": {"action": "deny", "risk_tier": "medium"}
}"#;

struct ForwardingNotifier {
    notified: AtomicUsize,
    tickets: mpsc::UnboundedSender<ApprovalTicket>,
}

#[async_trait]
impl ApprovalNotifier for ForwardingNotifier {
    async fn notify(&self, ticket: &ApprovalTicket) {
        self.notified.fetch_add(1, Ordering::SeqCst);
        let _ = self.tickets.send(ticket.clone());
    }
}

fn manifest_file() -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(MANIFEST.as_bytes()).unwrap();
    file
}

fn governor(config: &GovernorConfig) -> Governor {
    let file = manifest_file();
    let registry = Arc::new(ManifestRegistry::new());
    registry.load(load_manifest(file.path()).unwrap()).unwrap();
    Governor::new(registry, config.governor_options().unwrap())
}

fn request(role: &str, action: &str) -> DecisionRequest {
    DecisionRequest::new(ActorContext::new("agent-7", role).with_tenant("fleet-a"), action)
}

#[tokio::test]
async fn decisions_reduce_constraints_and_draw_budgets() {
    let governor = governor(&GovernorConfig::default());

    let night = request("operator", "mission.dispatch").with_metadata("night", json!(true));
    let result = governor.decide(&night).unwrap();
    assert!(result.is_allow());
    assert_eq!(result.reason(), ReasonCode::RuleAllow);
    assert_eq!(result.matched_rule().unwrap().as_str(), "dispatch");
    assert_eq!(result.constraints().limit("max_robots"), Some(4));
    assert_eq!(result.constraints().limit("max_speed_cm_s"), Some(60));
    assert_eq!(result.constraints().set("tools").unwrap().len(), 2);
    assert_eq!(result.manifest_version(), "2026.10.1");

    assert!(governor.decide(&request("operator", "mission.dispatch")).unwrap().is_allow());
    let exhausted = governor.decide(&request("operator", "mission.dispatch")).unwrap();
    assert_eq!(exhausted.reason(), ReasonCode::BudgetExhausted);
    assert!(exhausted.constraints().is_empty());

    let guest = governor.decide(&request("guest", "mission.dispatch")).unwrap();
    assert_eq!(guest.reason(), ReasonCode::RuleDeny);

    let unknown = governor.decide(&request("operator", "credits.spend")).unwrap();
    assert_eq!(unknown.reason(), ReasonCode::DefaultDeny);

    let snapshot = governor.metrics().snapshot();
    assert_eq!(snapshot.allowed, 2);
    assert_eq!(snapshot.denied, 3);
    assert_eq!(snapshot.budget_exhausted, 1);
}

#[tokio::test]
async fn escalations_wait_for_the_required_approver() {
    let mut config = GovernorConfig::default();
    config.hitl.enabled = true;
    config.hitl.approval_timeout_ms = 30_000;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let notifier = Arc::new(ForwardingNotifier {
        notified: AtomicUsize::new(0),
        tickets: tx,
    });
    let governor = Arc::new(governor(&config).with_notifier(notifier.clone()));

    let approver = {
        let governor = Arc::clone(&governor);
        tokio::spawn(async move {
            let queue = governor.approvals().unwrap();
            let ticket = rx.recv().await.unwrap();
            assert_eq!(ticket.required_approvers(), ["safety-officer"]);
            assert!(queue.approve(ticket.id(), "operator").is_err());
            queue.approve(ticket.id(), "safety-officer").unwrap();

            let ticket = rx.recv().await.unwrap();
            queue
                .reject(ticket.id(), "safety-officer", "no override during storms")
                .unwrap();
        })
    };

    let output = governor
        .execute(&request("operator", "safety.override"), |_| async { "overridden" })
        .await
        .unwrap();
    assert_eq!(output, "overridden");

    let err = governor
        .execute(&request("operator", "safety.disable-lidar"), |_| async {})
        .await
        .unwrap_err();
    assert!(matches!(err, GovernorError::Rejected { ref approver, .. } if approver == "safety-officer"));

    approver.await.unwrap();
    assert_eq!(notifier.notified.load(Ordering::SeqCst), 2);
    let snapshot = governor.metrics().snapshot();
    assert_eq!(snapshot.approvals_granted, 1);
    assert_eq!(snapshot.approvals_rejected, 1);
}

#[tokio::test(start_paused = true)]
async fn time_budgets_signal_then_cut_off() {
    let governor = governor(&GovernorConfig::default());

    let wound_down = governor
        .execute(&request("operator", "mission.run"), |signal| async move {
            signal.cancelled().await;
            tokio::time::sleep(Duration::from_millis(50)).await;
            "parked"
        })
        .await
        .unwrap();
    assert_eq!(wound_down, "parked");

    let err = governor
        .execute(&request("operator", "mission.run"), |_| {
            tokio::time::sleep(Duration::from_secs(60))
        })
        .await
        .unwrap_err();
    let GovernorError::Timeout(timeout) = err else {
        panic!("expected timeout, got {err:?}");
    };
    assert_eq!(timeout.limit, Duration::from_millis(200));
    assert_eq!(timeout.grace, Duration::from_millis(100));
    assert_eq!(timeout.elapsed, Duration::from_millis(300));
    assert_eq!(governor.metrics().snapshot().timeouts, 1);
}

#[tokio::test]
async fn shadow_mode_observes_without_blocking() {
    let config = GovernorConfig {
        mode: GovernorMode::Shadow,
        ..GovernorConfig::default()
    };
    let governor = governor(&config);

    for _ in 0..3 {
        assert!(governor.decide(&request("operator", "mission.dispatch")).unwrap().is_allow());
    }
    governor
        .execute(&request("guest", "mission.dispatch"), |_| async {})
        .await
        .unwrap();
    assert_eq!(governor.metrics().snapshot().shadow_overrides, 1);
}

#[test]
fn manifests_swap_without_disturbing_the_old_evaluator() {
    let file = manifest_file();
    let registry = ManifestRegistry::new();
    let first = registry.load(load_manifest(file.path()).unwrap()).unwrap();

    let mut next: serde_json::Value = serde_json::from_str(MANIFEST).unwrap();
    next["version"] = json!("2026.10.2");
    next["default"] = json!({"action": "allow", "risk_tier": "low"});
    registry
        .load(serde_json::from_value(next).unwrap())
        .unwrap();

    assert_eq!(registry.state("2026.10.1"), Some(ManifestState::Retired));
    assert_eq!(registry.active().unwrap().version(), "2026.10.2");
    assert_eq!(first.version(), "2026.10.1");
}
