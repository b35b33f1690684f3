//! # HTTP Router
//!
//! The external interface surface. Handlers stay thin: parse, call the
//! owning service, map the result. Status codes and headers follow the
//! wire contract in the crate docs.

use crate::auth::CallerDid;
use crate::error::ApiError;
use crate::state::AppState;
use ainp_bus::{StreamPublisher, Subject};
use ainp_crypto::{verify_envelope, TEST_SIGNATURE_SENTINEL};
use ainp_guard::GuardError;
use ainp_ledger::{PaymentMethod, PaymentRequest};
use ainp_negotiation::{IncentiveSplit, SessionState};
use ainp_pou::{AttestationType, UsefulnessProof, WorkType};
use ainp_routing::RouteError;
use ainp_types::{
    Did, DiscoveryQuery, Envelope, MsgType, NotificationBody, Payload,
};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

/// Build the full API router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // envelope ingress
        .route("/api/intents/send", post(send_intent))
        // discovery
        .route("/api/discovery/search", post(discovery_search))
        .route("/api/discovery/envelope", post(discovery_envelope))
        .route("/api/agents/register", post(register_agent))
        // mailbox
        .route("/api/mail/inbox", get(mail_inbox))
        .route("/api/mail/threads/:conversation_id", get(mail_thread))
        .route("/api/mail/read", post(mail_read))
        .route("/api/mail/label", post(mail_label))
        .route("/api/mail/contacts", post(mail_contacts))
        // negotiation
        .route("/api/negotiations", post(create_negotiation).get(list_negotiations))
        .route("/api/negotiations/:id", get(get_negotiation))
        .route("/api/negotiations/:id/propose", post(propose))
        .route("/api/negotiations/:id/accept", post(accept))
        .route("/api/negotiations/:id/reject", post(reject))
        .route("/api/negotiations/:id/settle", post(settle))
        // usefulness
        .route("/api/usefulness/proofs", post(submit_proof))
        .route("/api/usefulness/aggregate", post(trigger_aggregate))
        .route("/api/usefulness/agents/:did", get(agent_usefulness))
        // receipts & attestations
        .route("/api/receipts/:task_id", get(get_receipt))
        .route("/api/receipts/:task_id/committee", get(get_committee))
        .route("/api/receipts/:task_id/attestations", post(submit_attestation))
        .route("/api/receipts/:task_id/finalize", post(finalize_receipt))
        // payments
        .route("/api/payments/requests", post(create_payment_request))
        .route("/api/payments/requests/:id", get(get_payment_request))
        .route("/api/payments/webhook", post(payment_webhook))
        // credits
        .route("/api/credits/:did", get(credit_balance))
        .route("/api/credits/:did/transactions", get(credit_transactions))
        // stream introspection
        .route("/api/streams/:subject/lag", get(stream_lag))
        // health
        .route("/health", get(health))
        .route("/health/ready", get(ready))
        // sockets
        .route("/ws", get(crate::ws::ws_upgrade))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// envelope ingress
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct RoutedResponse {
    status: &'static str,
    agent_count: usize,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    degraded: bool,
}

async fn send_intent(
    State(state): State<AppState>,
    Json(envelope): Json<Envelope>,
) -> Result<Json<RoutedResponse>, ApiError> {
    match state.routing.deliver(&envelope).await {
        Ok(outcome) => Ok(Json(RoutedResponse {
            status: "routed",
            agent_count: outcome.agent_count,
            degraded: outcome.degraded,
        })),
        Err(RouteError::Guard(GuardError::PaymentRequired { required, .. })) => {
            // mint a top-up challenge the sender can settle and retry
            let request = state.payments.create_request(
                envelope.from_did.clone(),
                required,
                PaymentMethod::Credits,
                None,
                Some("postage top-up".to_string()),
                None,
            )?;
            Err(payment_challenge(&request))
        }
        Err(err) => Err(err.into()),
    }
}

fn payment_challenge(request: &PaymentRequest) -> ApiError {
    let method = match request.method {
        PaymentMethod::Credits => "credits",
        PaymentMethod::Coinbase => "coinbase",
        PaymentMethod::Lightning => "lightning",
        PaymentMethod::Usdc => "usdc",
    };
    ApiError::payment_required(
        &request.id.to_string(),
        method,
        &format!("/api/payments/requests/{}", request.id),
    )
}

// ---------------------------------------------------------------------------
// discovery
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct SearchResponse {
    matches: Vec<ainp_types::DiscoveryMatch>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    degraded: bool,
}

async fn discovery_search(
    State(state): State<AppState>,
    _caller: CallerDid,
    Json(query): Json<DiscoveryQuery>,
) -> Result<Json<SearchResponse>, ApiError> {
    let outcome = state.discovery.search(&query).await;
    Ok(Json(SearchResponse {
        matches: outcome.matches,
        degraded: outcome.degraded,
    }))
}

/// `ADVERTISE` registers; `DISCOVER` routes a result envelope back to the
/// requester's subject.
async fn discovery_envelope(
    State(state): State<AppState>,
    Json(envelope): Json<Envelope>,
) -> Result<Json<serde_json::Value>, ApiError> {
    match &envelope.payload {
        Payload::Advertise(_) => {
            let registered = register_from_envelope(&state, &envelope).await?;
            Ok(Json(json!({"status": "registered", "capabilities": registered})))
        }
        Payload::Discover(_) => {
            let outcome = state.routing.deliver(&envelope).await?;
            Ok(Json(json!({"status": "routed", "agent_count": outcome.agent_count})))
        }
        _ => Err(ApiError::bad_request(
            "discovery ingress accepts ADVERTISE or DISCOVER envelopes",
        )),
    }
}

async fn register_agent(
    State(state): State<AppState>,
    Json(envelope): Json<Envelope>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let registered = register_from_envelope(&state, &envelope).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({"status": "registered", "capabilities": registered})),
    ))
}

async fn register_from_envelope(
    state: &AppState,
    envelope: &Envelope,
) -> Result<usize, ApiError> {
    verify_ingress(state, envelope)?;
    let Payload::Advertise(body) = &envelope.payload else {
        return Err(ApiError::bad_request("registration requires an ADVERTISE payload"));
    };

    let registered = state
        .discovery
        .register(
            &envelope.from_did,
            &body.capabilities,
            body.trust_seed,
            body.ttl_seconds,
        )
        .await?;

    if state.config.credits.enabled {
        state
            .ledger
            .ensure_account(&envelope.from_did, state.config.credits.initial_allocation);
    }

    // registry lifecycle event for interested consumers
    let event = Envelope::new(
        envelope.from_did.clone(),
        None,
        MsgType::Notification,
        Payload::Notification(NotificationBody {
            event: "agent.registered".into(),
            data: json!({"did": envelope.from_did, "capabilities": registered}),
        }),
        state.clock.now_ms(),
    );
    // registration must not fail on a down stream; the registry row is in
    let _ = state
        .bus
        .publish(&Subject::agents_event("registered"), event)
        .await;

    Ok(registered)
}

fn verify_ingress(state: &AppState, envelope: &Envelope) -> Result<(), ApiError> {
    if state.config.signature.enabled {
        verify_envelope(envelope)?;
        return Ok(());
    }
    if state.config.signature.allow_test_sentinel
        && envelope.signature.as_deref() == Some(TEST_SIGNATURE_SENTINEL)
    {
        return Ok(());
    }
    if envelope.signature.is_some() {
        return Ok(());
    }
    Err(ainp_crypto::CryptoError::SignatureMissing.into())
}

// ---------------------------------------------------------------------------
// mailbox
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct InboxParams {
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    cursor: Option<String>,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    unread: Option<bool>,
}

async fn mail_inbox(
    State(state): State<AppState>,
    CallerDid(caller): CallerDid,
    Query(params): Query<InboxParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let page = state.mail.inbox(
        &caller,
        &ainp_mail::InboxQuery {
            limit: params.limit.unwrap_or(0),
            cursor: params.cursor,
            label: params.label,
            unread_only: params.unread.unwrap_or(false),
        },
    );
    Ok(Json(json!({
        "messages": page.messages,
        "next_cursor": page.next_cursor,
    })))
}

async fn mail_thread(
    State(state): State<AppState>,
    CallerDid(caller): CallerDid,
    Path(conversation_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (thread, messages) = state.mail.thread(&conversation_id)?;
    if !thread.participants.contains(&caller) {
        return Err(ainp_mail::MailError::NotAParticipant(caller).into());
    }
    Ok(Json(json!({"thread": thread, "messages": messages})))
}

#[derive(Debug, Deserialize)]
struct ReadRequest {
    message_id: String,
    /// Present for forward compatibility; read state only moves forward.
    #[serde(default)]
    #[allow(dead_code)]
    read: Option<bool>,
}

async fn mail_read(
    State(state): State<AppState>,
    CallerDid(caller): CallerDid,
    Json(request): Json<ReadRequest>,
) -> Result<Json<ainp_mail::MessageRow>, ApiError> {
    Ok(Json(state.mail.mark_read(&caller, &request.message_id)?))
}

#[derive(Debug, Deserialize)]
struct LabelRequest {
    message_id: String,
    #[serde(default)]
    add: Vec<String>,
    #[serde(default)]
    remove: Vec<String>,
}

async fn mail_label(
    State(state): State<AppState>,
    CallerDid(caller): CallerDid,
    Json(request): Json<LabelRequest>,
) -> Result<Json<ainp_mail::MessageRow>, ApiError> {
    Ok(Json(state.mail.label(
        &caller,
        &request.message_id,
        &request.add,
        &request.remove,
    )?))
}

#[derive(Debug, Deserialize)]
struct ContactRequest {
    peer: Did,
    consent: ainp_mail::ConsentState,
    #[serde(default)]
    alias: Option<String>,
    #[serde(default)]
    allowlist: Option<bool>,
}

async fn mail_contacts(
    State(state): State<AppState>,
    CallerDid(caller): CallerDid,
    Json(request): Json<ContactRequest>,
) -> Result<Json<ainp_mail::Contact>, ApiError> {
    Ok(Json(state.mail.set_consent(
        &caller,
        &request.peer,
        request.consent,
        request.alias,
        request.allowlist,
    )))
}

// ---------------------------------------------------------------------------
// negotiation
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CreateNegotiationRequest {
    intent_id: String,
    initiator_did: Did,
    responder_did: Did,
    initial_proposal: serde_json::Value,
    #[serde(default)]
    max_rounds: Option<u32>,
    #[serde(default)]
    ttl_minutes: Option<u64>,
}

async fn create_negotiation(
    State(state): State<AppState>,
    CallerDid(caller): CallerDid,
    Json(request): Json<CreateNegotiationRequest>,
) -> Result<(StatusCode, Json<ainp_negotiation::Session>), ApiError> {
    if caller != request.initiator_did {
        return Err(ainp_negotiation::NegotiationError::NotAParticipant(caller).into());
    }
    let session = state
        .negotiation
        .initiate(
            request.intent_id,
            request.initiator_did,
            request.responder_did,
            request.initial_proposal,
            request.max_rounds,
            request.ttl_minutes,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(session)))
}

#[derive(Debug, Deserialize)]
struct ListNegotiationsParams {
    #[serde(default)]
    agent_did: Option<Did>,
    #[serde(default)]
    state: Option<SessionState>,
}

async fn list_negotiations(
    State(state): State<AppState>,
    _caller: CallerDid,
    Query(params): Query<ListNegotiationsParams>,
) -> Result<Json<Vec<ainp_negotiation::Session>>, ApiError> {
    Ok(Json(
        state.negotiation.list(params.agent_did.as_ref(), params.state),
    ))
}

async fn get_negotiation(
    State(state): State<AppState>,
    _caller: CallerDid,
    Path(id): Path<Uuid>,
) -> Result<Json<ainp_negotiation::Session>, ApiError> {
    Ok(Json(state.negotiation.get(id).await?))
}

#[derive(Debug, Deserialize)]
struct ProposeRequest {
    proposal: serde_json::Value,
}

async fn propose(
    State(state): State<AppState>,
    CallerDid(caller): CallerDid,
    Path(id): Path<Uuid>,
    Json(request): Json<ProposeRequest>,
) -> Result<Json<ainp_negotiation::Session>, ApiError> {
    Ok(Json(
        state.negotiation.counter(id, &caller, request.proposal).await?,
    ))
}

async fn accept(
    State(state): State<AppState>,
    CallerDid(caller): CallerDid,
    Path(id): Path<Uuid>,
) -> Result<Json<ainp_negotiation::Session>, ApiError> {
    Ok(Json(state.negotiation.accept(id, &caller).await?))
}

async fn reject(
    State(state): State<AppState>,
    CallerDid(caller): CallerDid,
    Path(id): Path<Uuid>,
) -> Result<Json<ainp_negotiation::Session>, ApiError> {
    Ok(Json(state.negotiation.reject(id, &caller).await?))
}

#[derive(Debug, Deserialize, Default)]
struct SettleRequest {
    #[serde(default)]
    incentive_split: Option<IncentiveSplit>,
    #[serde(default)]
    validator_did: Option<Did>,
    #[serde(default)]
    usefulness_proof_id: Option<String>,
}

async fn settle(
    State(state): State<AppState>,
    CallerDid(caller): CallerDid,
    Path(id): Path<Uuid>,
    body: Option<Json<SettleRequest>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let outcome = state
        .negotiation
        .settle(
            id,
            &caller,
            request.incentive_split,
            request.validator_did,
            request.usefulness_proof_id,
        )
        .await?;
    Ok(Json(json!({
        "status": "settled",
        "distribution": outcome.distribution,
        "receipt_id": outcome.receipt_id,
    })))
}

// ---------------------------------------------------------------------------
// usefulness
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ProofRequest {
    work_type: WorkType,
    metrics: std::collections::HashMap<String, f64>,
    #[serde(default)]
    attestations: Vec<String>,
    #[serde(default)]
    trace_id: Option<String>,
    timestamp: u64,
}

async fn submit_proof(
    State(state): State<AppState>,
    CallerDid(caller): CallerDid,
    Json(request): Json<ProofRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let proof = UsefulnessProof {
        id: Uuid::new_v4(),
        agent: caller,
        work_type: request.work_type,
        metrics: request.metrics,
        attestations: request.attestations,
        trace_id: request.trace_id.unwrap_or_else(|| Uuid::new_v4().to_string()),
        timestamp: request.timestamp,
    };
    let proof_id = proof.id;
    let score = state.usefulness.submit_proof(proof)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({"proof_id": proof_id, "score": score})),
    ))
}

async fn trigger_aggregate(
    State(state): State<AppState>,
    _caller: CallerDid,
) -> Result<Json<serde_json::Value>, ApiError> {
    let agents = state.usefulness.aggregate();
    Ok(Json(json!({"status": "aggregated", "agents": agents})))
}

async fn agent_usefulness(
    State(state): State<AppState>,
    _caller: CallerDid,
    Path(did): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let did = Did::parse(did).map_err(|e| ApiError::bad_request(e.to_string()))?;
    Ok(Json(json!({
        "did": did,
        "usefulness": state.discovery.usefulness(&did),
        "rolling_score": state.usefulness.rolling_score(&did),
        "reputation": state.receipts.reputation(&did),
    })))
}

// ---------------------------------------------------------------------------
// receipts & attestations
// ---------------------------------------------------------------------------

async fn get_receipt(
    State(state): State<AppState>,
    _caller: CallerDid,
    Path(task_id): Path<Uuid>,
) -> Result<Json<ainp_pou::TaskReceipt>, ApiError> {
    Ok(Json(state.receipts.receipt(task_id)?))
}

async fn get_committee(
    State(state): State<AppState>,
    _caller: CallerDid,
    Path(task_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let committee = state.receipts.committee(task_id)?;
    Ok(Json(json!({"task_id": task_id, "committee": committee})))
}

#[derive(Debug, Deserialize)]
struct AttestationRequest {
    #[serde(rename = "type")]
    attestation_type: AttestationType,
    score: f64,
    confidence: f64,
    #[serde(default)]
    evidence_ref: Option<String>,
    #[serde(default)]
    signature: Option<String>,
}

async fn submit_attestation(
    State(state): State<AppState>,
    CallerDid(caller): CallerDid,
    Path(task_id): Path<Uuid>,
    Json(request): Json<AttestationRequest>,
) -> Result<(StatusCode, Json<ainp_pou::Attestation>), ApiError> {
    let attestation = state.receipts.attest(
        task_id,
        &caller,
        request.attestation_type,
        request.score,
        request.confidence,
        request.evidence_ref,
        request.signature,
    )?;
    Ok((StatusCode::CREATED, Json(attestation)))
}

async fn finalize_receipt(
    State(state): State<AppState>,
    _caller: CallerDid,
    Path(task_id): Path<Uuid>,
) -> Result<Json<ainp_pou::TaskReceipt>, ApiError> {
    Ok(Json(state.receipts.finalize(task_id)?))
}

// ---------------------------------------------------------------------------
// payments
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CreatePaymentRequest {
    amount_atomic: u64,
    method: PaymentMethod,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    expires_in_seconds: Option<u64>,
}

async fn create_payment_request(
    State(state): State<AppState>,
    CallerDid(caller): CallerDid,
    Json(request): Json<CreatePaymentRequest>,
) -> Result<(StatusCode, Json<PaymentRequest>), ApiError> {
    let created = state.payments.create_request(
        caller,
        request.amount_atomic,
        request.method,
        request.currency,
        request.description,
        request.expires_in_seconds,
    )?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn get_payment_request(
    State(state): State<AppState>,
    _caller: CallerDid,
    Path(id): Path<Uuid>,
) -> Result<Json<PaymentRequest>, ApiError> {
    Ok(Json(state.payments.get(id)?))
}

#[derive(Debug, Deserialize)]
struct WebhookRequest {
    request_id: Uuid,
    provider: String,
    tx_ref: String,
    #[serde(default)]
    raw: serde_json::Value,
}

/// Provider webhooks are verified upstream (provider-specific HMAC); here
/// the referenced request must exist and still be open.
async fn payment_webhook(
    State(state): State<AppState>,
    Json(request): Json<WebhookRequest>,
) -> Result<Json<ainp_ledger::PaymentReceipt>, ApiError> {
    Ok(Json(state.payments.confirm(
        request.request_id,
        &request.provider,
        &request.tx_ref,
        request.raw,
    )?))
}

// ---------------------------------------------------------------------------
// credits
// ---------------------------------------------------------------------------

async fn credit_balance(
    State(state): State<AppState>,
    CallerDid(caller): CallerDid,
    Path(did): Path<String>,
) -> Result<Json<ainp_ledger::CreditAccount>, ApiError> {
    let did = Did::parse(did).map_err(|e| ApiError::bad_request(e.to_string()))?;
    if caller != did {
        return Err(ApiError::new(
            StatusCode::FORBIDDEN,
            "FORBIDDEN",
            "credit balances are private to their owner",
        ));
    }
    Ok(Json(state.ledger.balance(&did)?))
}

#[derive(Debug, Deserialize)]
struct TransactionsParams {
    #[serde(default)]
    limit: Option<usize>,
}

async fn credit_transactions(
    State(state): State<AppState>,
    CallerDid(caller): CallerDid,
    Path(did): Path<String>,
    Query(params): Query<TransactionsParams>,
) -> Result<Json<Vec<ainp_ledger::CreditTransaction>>, ApiError> {
    let did = Did::parse(did).map_err(|e| ApiError::bad_request(e.to_string()))?;
    if caller != did {
        return Err(ApiError::new(
            StatusCode::FORBIDDEN,
            "FORBIDDEN",
            "credit history is private to its owner",
        ));
    }
    Ok(Json(
        state.ledger.transactions(&did, params.limit.unwrap_or(100))?,
    ))
}

// ---------------------------------------------------------------------------
// streams & health
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct LagParams {
    consumer: String,
}

async fn stream_lag(
    State(state): State<AppState>,
    _caller: CallerDid,
    Path(subject): Path<String>,
    Query(params): Query<LagParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let subject = Subject::from_raw(subject);
    let lag = state.bus.lag(&subject, &params.consumer);
    Ok(Json(json!({
        "subject": subject,
        "consumer": params.consumer,
        "lag": lag,
    })))
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let stream_ok = state.bus.is_available();
    Json(json!({
        "status": if stream_ok { "ok" } else { "degraded" },
        "components": {
            "db": "ok",
            "cache": "ok",
            "stream": if stream_ok { "ok" } else { "down" },
        },
        "connections": state.sockets.connection_count(),
    }))
}

async fn ready(State(state): State<AppState>) -> Result<&'static str, ApiError> {
    if state.bus.is_available() {
        Ok("ready")
    } else {
        Err(ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "NOT_READY",
            "not_ready",
        ))
    }
}
