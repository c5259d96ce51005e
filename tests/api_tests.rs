//! Integration tests for the registry REST API.
//!
//! Most tests drive the axum router directly through `oneshot`. The last
//! group binds a real listener and runs the full pipeline through
//! `HttpLedger`.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::time::Duration;
use tower::ServiceExt;
use use_delegation_lab::api::{AppState, build_router, start_slot_clock};
use use_delegation_lab::config::{ConfirmSettings, DemoOptions};
use use_delegation_lab::http::HttpLedger;
use use_delegation_lab::orchestrator::{Orchestrator, Step, StepOutcome};
use use_delegation_lab::sdk::*;

// ─── Test helpers ───────────────────────────────────────────

fn test_state() -> AppState {
    AppState {
        ledger: MemoryLedger::default(),
    }
}

/// Send a POST request with JSON body, return (status, parsed JSON).
async fn post_json(app: axum::Router, uri: &str, body: &str) -> (StatusCode, Value) {
    let req = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&bytes).unwrap();
    (status, json)
}

/// Send a GET request, return (status, parsed JSON).
async fn get_json(app: axum::Router, uri: &str) -> (StatusCode, Value) {
    let req = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&bytes).unwrap();
    (status, json)
}

async fn airdrop(state: &AppState, who: &PrincipalId, amount: u64) -> (StatusCode, Value) {
    let body = json!({ "recipient": who, "amount": amount }).to_string();
    post_json(build_router(state.clone()), "/airdrop", &body).await
}

async fn submit(state: &AppState, tx: &SignedOperation) -> (StatusCode, Value) {
    let body = serde_json::to_string(tx).unwrap();
    post_json(build_router(state.clone()), "/transactions", &body).await
}

/// Fund an owner and create a two-use capability directly on the ledger.
async fn seeded_capability(state: &AppState) -> (Principal, CapabilityId) {
    let owner = Principal::generate();
    state
        .ledger
        .request_airdrop(&owner.id(), UNITS_PER_COIN)
        .await
        .unwrap();
    let config = CapabilityBuilder::new()
        .uses(UseMethod::Burn, 2)
        .build()
        .unwrap();
    let nonce = uuid::Uuid::new_v4();
    let capability = CapabilityId::derive(&owner.id(), &nonce);
    let tx = Operation::with_nonce(
        nonce,
        owner.id(),
        Instruction::CreateCapability { capability, config },
    )
    .sign(&owner);
    state.ledger.send_transaction(&tx).await.unwrap();
    (owner, capability)
}

// ─── Health and accounts ────────────────────────────────────

mod accounts {
    use super::*;

    #[tokio::test]
    async fn health_reports_slot() {
        let state = test_state();
        state.ledger.advance_slot().await;
        let (status, json) = get_json(build_router(state), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
        assert_eq!(json["slot"], 1);
    }

    #[tokio::test]
    async fn airdrop_then_balance() {
        let state = test_state();
        let p = Principal::generate();
        let (status, json) = airdrop(&state, &p.id(), 1_000).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json["signature"].as_str().unwrap().len(), 128);

        let uri = format!("/accounts/{}", p.id());
        let (status, json) = get_json(build_router(state), &uri).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["balance"], 1_000);
        assert_eq!(json["address"], p.id().to_string());
    }

    #[tokio::test]
    async fn airdrop_over_limit_carries_rejection() {
        let state = test_state();
        let p = Principal::generate();
        let (status, json) = airdrop(&state, &p.id(), 100 * UNITS_PER_COIN).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["rejection"]["kind"], "airdrop_limit_exceeded");
    }

    #[tokio::test]
    async fn malformed_address_is_bad_request() {
        let (status, json) = get_json(build_router(test_state()), "/accounts/not-an-address").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json.get("rejection").is_none());
    }

    #[tokio::test]
    async fn unknown_account_has_zero_balance() {
        let uri = format!("/accounts/{}", Principal::generate().id());
        let (status, json) = get_json(build_router(test_state()), &uri).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["balance"], 0);
    }
}

// ─── Transactions ───────────────────────────────────────────

mod transactions {
    use super::*;

    #[tokio::test]
    async fn submit_then_resubmit() {
        let state = test_state();
        let (owner, _) = seeded_capability(&state).await;
        let tx = Operation::new(
            owner.id(),
            Instruction::Transfer {
                recipient: Principal::generate().id(),
                amount: 10,
            },
        )
        .sign(&owner);

        let (status, first) = submit(&state, &tx).await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, second) = submit(&state, &tx).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["signature"], second["signature"]);
        assert_eq!(first["signature"], tx.signature.to_string());
    }

    #[tokio::test]
    async fn use_without_delegation_is_rejected() {
        let state = test_state();
        let (_, capability) = seeded_capability(&state).await;
        let stranger = Principal::generate();
        state
            .ledger
            .request_airdrop(&stranger.id(), UNITS_PER_COIN)
            .await
            .unwrap();
        let tx = Operation::new(
            stranger.id(),
            Instruction::Utilize {
                capability,
                number_of_uses: 1,
            },
        )
        .sign(&stranger);

        let (status, json) = submit(&state, &tx).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["rejection"]["kind"], "no_delegation");
        let rejection: RegistryError = serde_json::from_value(json["rejection"].clone()).unwrap();
        assert!(rejection.is_use_rejection());
    }

    #[tokio::test]
    async fn forged_signature_is_rejected() {
        let state = test_state();
        let (owner, _) = seeded_capability(&state).await;
        let mut tx = Operation::new(
            owner.id(),
            Instruction::Transfer {
                recipient: Principal::generate().id(),
                amount: 10,
            },
        )
        .sign(&owner);
        tx.operation.instruction = Instruction::Transfer {
            recipient: Principal::generate().id(),
            amount: 10_000,
        };
        let (status, json) = submit(&state, &tx).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["rejection"]["kind"], "invalid_signature");
    }

    #[tokio::test]
    async fn known_signature_does_not_cover_a_new_body() {
        let state = test_state();
        let (owner, _) = seeded_capability(&state).await;
        let tx = Operation::new(
            owner.id(),
            Instruction::Transfer {
                recipient: Principal::generate().id(),
                amount: 10,
            },
        )
        .sign(&owner);
        let (status, _) = submit(&state, &tx).await;
        assert_eq!(status, StatusCode::CREATED);

        let thief = Principal::generate();
        let mut altered = tx.clone();
        altered.operation.instruction = Instruction::Transfer {
            recipient: thief.id(),
            amount: 10_000,
        };
        let (status, json) = submit(&state, &altered).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["rejection"]["kind"], "invalid_signature");
        assert_eq!(state.ledger.get_balance(&thief.id()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn status_of_known_and_unknown_signatures() {
        let state = test_state();
        let p = Principal::generate();
        let (_, json) = airdrop(&state, &p.id(), 1).await;
        let sig = json["signature"].as_str().unwrap().to_string();

        let (status, json) =
            get_json(build_router(state.clone()), &format!("/transactions/{sig}")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["slot"], 0);
        assert_eq!(json["status"], "confirmed");

        let unknown = "ab".repeat(64);
        let (status, _) =
            get_json(build_router(state.clone()), &format!("/transactions/{unknown}")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = get_json(build_router(state), "/transactions/xyz").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}

// ─── Capabilities ───────────────────────────────────────────

mod capabilities {
    use super::*;

    #[tokio::test]
    async fn get_capability_state() {
        let state = test_state();
        let (owner, capability) = seeded_capability(&state).await;
        let (status, json) =
            get_json(build_router(state), &format!("/capabilities/{capability}")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["owner"], owner.id().to_string());
        assert_eq!(json["uses"]["remaining"], 2);
        assert_eq!(json["uses"]["use_method"], "burn");
        assert_eq!(json["delegation"], Value::Null);
        assert_eq!(json["max_supply"], 1);
    }

    #[tokio::test]
    async fn unknown_capability_is_404() {
        let id = CapabilityId::derive(&Principal::generate().id(), &uuid::Uuid::new_v4());
        let (status, json) =
            get_json(build_router(test_state()), &format!("/capabilities/{id}")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(json["error"].as_str().unwrap().contains("not found"));
    }
}

// ─── Over the wire ──────────────────────────────────────────

mod over_http {
    use super::*;

    async fn serve() -> String {
        let state = AppState {
            ledger: MemoryLedger::default().with_auto_advance(false),
        };
        start_slot_clock(state.clone(), Duration::from_millis(5));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, build_router(state)).await.unwrap();
        });
        format!("http://{addr}/")
    }

    #[tokio::test]
    async fn zero_period_slot_clock_still_ticks() {
        let state = AppState {
            ledger: MemoryLedger::default().with_auto_advance(false),
        };
        let clock = start_slot_clock(state.clone(), Duration::ZERO);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!clock.is_finished());
        assert!(state.ledger.slot().await > 0);
        clock.abort();
    }

    #[tokio::test]
    async fn full_run_through_http_ledger() {
        let url = serve().await;
        let ledger = HttpLedger::new(&url).unwrap();
        assert_eq!(ledger.base_url(), url.trim_end_matches('/'));
        ledger.health().await.unwrap();

        let options = DemoOptions {
            confirm: ConfirmSettings {
                poll_interval_ms: 5,
                timeout_secs: 10,
            },
            ..DemoOptions::default()
        };
        let client = CapabilityClient::new(ledger).with_confirm_options(options.confirm_options());
        let orch =
            Orchestrator::new(client, options, Principal::generate(), Principal::generate())
                .unwrap();
        let report = orch.run().await.unwrap();

        assert_eq!(report.steps.len(), Step::ALL.len());
        assert!(matches!(
            report.steps[5].outcome,
            StepOutcome::RejectedAsExpected { .. }
        ));
        assert_eq!(report.final_state.uses.remaining, 1);
        assert_eq!(report.final_state.delegate(), None);
    }

    #[tokio::test]
    async fn rejection_survives_the_wire() {
        let url = serve().await;
        let ledger = HttpLedger::new(&url).unwrap();
        let stranger = Principal::generate();
        let capability = CapabilityId::derive(&stranger.id(), &uuid::Uuid::new_v4());
        let tx = Operation::new(
            stranger.id(),
            Instruction::Utilize {
                capability,
                number_of_uses: 1,
            },
        )
        .sign(&stranger);
        let err = ledger.send_transaction(&tx).await.unwrap_err();
        assert!(matches!(
            err.rejection(),
            Some(RegistryError::InsufficientFunds { .. })
        ));
        assert!(ledger.get_capability(&capability).await.unwrap().is_none());
    }
}
