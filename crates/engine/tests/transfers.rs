use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Statement};
use uuid::Uuid;

use engine::{
    Account, Argon2Hasher, NewCard, Engine, EngineError, ErrorKind, GatewayResult, MAX_TOKEN_ATTEMPTS,
    MessageTransport, Money, NotificationEvent, Notifier, OutboundMessage, Outbox,
    PaymentGateway, TokenSource, TokenStatus, TopUpOutcome, Verification,
};
use migration::MigratorTrait;

/// Gateway whose answers are scripted per reference. Lookups are lenient
/// the way real providers are: only the last path segment counts, anything
/// after `?` or `#` is dropped and case is ignored.
#[derive(Default)]
struct ScriptedGateway {
    charges: Mutex<HashMap<String, Verification>>,
}

impl ScriptedGateway {
    fn lookup_key(reference: &str) -> String {
        let segment = reference.rsplit('/').next().unwrap_or(reference);
        let end = segment.find(['?', '#']).unwrap_or(segment.len());
        segment[..end].to_ascii_uppercase()
    }

    fn settle(&self, reference: &str, status: &str, amount_minor: i64) {
        self.charges.lock().unwrap().insert(
            Self::lookup_key(reference),
            Verification {
                status: status.to_string(),
                reference: Some(reference.to_string()),
                amount: Money::new(amount_minor),
                authorization: Some(format!("AUTH_{reference}")),
            },
        );
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn initialize(&self, email: &str, amount: Money) -> GatewayResult<String> {
        Ok(format!("access-{email}-{}", amount.minor()))
    }

    async fn verify(&self, reference: &str) -> GatewayResult<Verification> {
        self.charges
            .lock()
            .unwrap()
            .get(&Self::lookup_key(reference))
            .cloned()
            .ok_or_else(|| "unknown reference".into())
    }
}

#[derive(Default)]
struct RecordingNotifier {
    events: Mutex<Vec<(Uuid, NotificationEvent)>>,
}

impl Notifier for RecordingNotifier {
    fn notify(&self, account_id: Uuid, event: &NotificationEvent) {
        self.events
            .lock()
            .unwrap()
            .push((account_id, event.clone()));
    }
}

#[derive(Default)]
struct RecordingTransport {
    sent: Mutex<Vec<OutboundMessage>>,
}

#[async_trait]
impl MessageTransport for RecordingTransport {
    async fn send(&self, message: &OutboundMessage) -> Result<(), String> {
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

/// Always hands out the same token.
struct FixedTokenSource;

impl TokenSource for FixedTokenSource {
    fn generate(&self) -> String {
        "AAAAA-BBBBB-CCCCC-DDDDD".to_string()
    }
}

struct Harness {
    engine: Arc<Engine>,
    db: DatabaseConnection,
    gateway: Arc<ScriptedGateway>,
    notifier: Arc<RecordingNotifier>,
}

async fn harness() -> Harness {
    harness_with(|builder| builder).await
}

async fn harness_with(
    customize: impl FnOnce(engine::EngineBuilder) -> engine::EngineBuilder,
) -> Harness {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();

    let gateway = Arc::new(ScriptedGateway::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let builder = Engine::builder()
        .database(db.clone())
        .hasher(Arc::new(Argon2Hasher::with_params(8, 1, 1).unwrap()))
        .gateway(gateway.clone())
        .notifier(notifier.clone());
    let engine = customize(builder).build().await.unwrap();

    Harness {
        engine: Arc::new(engine),
        db,
        gateway,
        notifier,
    }
}

impl Harness {
    async fn account(&self, email: &str) -> Account {
        self.engine
            .register(email, "Test User", "secret1")
            .await
            .unwrap()
    }

    async fn fund(&self, account: &Account, amount_minor: i64) {
        let reference = format!("ref-{}", Uuid::new_v4());
        self.gateway.settle(&reference, "success", amount_minor);
        self.engine
            .reconcile_top_up(&reference, account.id)
            .await
            .unwrap();
    }

    async fn balance(&self, account: &Account) -> i64 {
        self.engine.wallet(account.id).await.unwrap().balance.minor()
    }

    async fn count(&self, table: &str) -> i64 {
        let backend = self.db.get_database_backend();
        let row = self
            .db
            .query_one(Statement::from_string(
                backend,
                format!("SELECT COUNT(*) AS n FROM {table}"),
            ))
            .await
            .unwrap()
            .unwrap();
        row.try_get("", "n").unwrap()
    }

    /// Sender with a PIN and `funds`, receiver, and a token bound for `amount`.
    async fn bound_transfer(&self, funds: i64, amount: i64) -> (Account, Account, String) {
        let sender = self.account(&format!("s{}@example.com", Uuid::new_v4())).await;
        let receiver = self.account(&format!("r{}@example.com", Uuid::new_v4())).await;
        self.fund(&sender, funds).await;
        self.engine.set_pin(sender.id, "1234").await.unwrap();

        let token = self.engine.issue_token(sender.id).await.unwrap().token;
        self.engine
            .bind_token(&token, receiver.id, Money::new(amount))
            .await
            .unwrap();
        (sender, receiver, token)
    }
}

#[tokio::test]
async fn registration_creates_an_empty_wallet() {
    let h = harness().await;

    let account = h
        .engine
        .register("a@b.com", "Jane Doe", "secret1")
        .await
        .unwrap();

    assert_eq!(account.email, "a@b.com");
    assert_eq!(account.display_name, "Jane Doe");
    assert_eq!(h.balance(&account).await, 0);
}

#[tokio::test]
async fn duplicate_email_is_a_conflict() {
    let h = harness().await;
    h.engine
        .register("a@b.com", "Jane Doe", "secret1")
        .await
        .unwrap();

    let err = h
        .engine
        .register(" A@B.com ", "Janet Doe", "secret2")
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert!(err.to_string().contains("already in use"));
    assert_eq!(h.count("accounts").await, 1);
    assert_eq!(h.count("wallets").await, 1);
}

#[tokio::test]
async fn registration_validates_input() {
    let h = harness().await;

    let bad = [
        ("not-an-email", "Jane Doe", "secret1"),
        ("a@b.com", "Jo", "secret1"),
        ("a@b.com", "Jane Doe", "abc"),
    ];
    for (email, name, password) in bad {
        let err = h.engine.register(email, name, password).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation, "{email} {name} {password}");
    }
    assert_eq!(h.count("accounts").await, 0);
}

#[tokio::test]
async fn authenticate_checks_password() {
    let h = harness().await;
    let account = h.account("a@b.com").await;

    let logged_in = h.engine.authenticate("A@b.com", "secret1").await.unwrap();
    assert_eq!(logged_in.id, account.id);

    assert_eq!(
        h.engine.authenticate("a@b.com", "wrong-password").await,
        Err(EngineError::InvalidCredentials)
    );
    assert_eq!(
        h.engine
            .authenticate("nobody@b.com", "secret1")
            .await
            .unwrap_err()
            .kind(),
        ErrorKind::NotFound
    );
}

#[tokio::test]
async fn welcome_email_is_queued_after_registration() {
    let transport = Arc::new(RecordingTransport::default());
    let (outbox, handle) = Outbox::start(transport.clone(), 8, 1);
    let h = harness_with(|builder| builder.outbox(outbox)).await;

    h.account("a@b.com").await;
    drop(h);
    handle.shutdown().await;

    let sent = transport.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert!(matches!(&sent[0], OutboundMessage::Email { to, .. } if to == "a@b.com"));
}

#[tokio::test]
async fn issued_tokens_start_open() {
    let h = harness().await;
    let sender = h.account("a@b.com").await;

    let token = h.engine.issue_token(sender.id).await.unwrap();

    assert_eq!(token.status, TokenStatus::Open);
    assert_eq!(token.sender.id, sender.id);
    assert!(token.receiver.is_none());
    assert!(token.amount.is_none());
    assert_eq!(
        h.engine.lookup_token(&token.token).await.unwrap(),
        Some(token)
    );
}

#[tokio::test]
async fn issuing_for_unknown_sender_fails() {
    let h = harness().await;
    let ghost = Uuid::new_v4();

    assert_eq!(
        h.engine.issue_token(ghost).await,
        Err(EngineError::AccountNotFound(ghost.to_string()))
    );
}

#[tokio::test]
async fn token_generation_gives_up_after_repeated_collisions() {
    let h = harness_with(|builder| builder.token_source(Arc::new(FixedTokenSource))).await;
    let sender = h.account("a@b.com").await;

    h.engine.issue_token(sender.id).await.unwrap();

    assert_eq!(
        h.engine.issue_token(sender.id).await,
        Err(EngineError::ExhaustedRetries(MAX_TOKEN_ATTEMPTS))
    );
    assert_eq!(h.count("transfer_tokens").await, 1);
}

#[tokio::test]
async fn binding_unknown_token_creates_nothing() {
    let h = harness().await;
    let receiver = h.account("r@b.com").await;

    assert_eq!(
        h.engine
            .bind_token("NOPE0-NOPE0-NOPE0-NOPE0", receiver.id, Money::new(100))
            .await,
        Err(EngineError::TokenNotFound(
            "NOPE0-NOPE0-NOPE0-NOPE0".to_string()
        ))
    );
    assert_eq!(h.count("transfer_tokens").await, 0);
}

#[tokio::test]
async fn binding_notifies_the_sender() {
    let h = harness().await;
    let (sender, receiver, token) = h.bound_transfer(1_000, 300).await;

    let events = h.notifier.events.lock().unwrap();
    assert_eq!(events.len(), 1);
    let (addressee, event) = &events[0];
    assert_eq!(*addressee, sender.id);
    let NotificationEvent::TokenBound {
        token: bound,
        amount,
        receiver: party,
    } = event;
    assert_eq!(bound, &token);
    assert_eq!(*amount, Money::new(300));
    assert_eq!(party.id, receiver.id);
}

#[tokio::test]
async fn binding_rules() {
    let h = harness().await;
    let (sender, receiver, token) = h.bound_transfer(1_000, 300).await;
    let intruder = h.account("x@b.com").await;

    // The same receiver may revise the amount.
    let rebound = h
        .engine
        .bind_token(&token, receiver.id, Money::new(400))
        .await
        .unwrap();
    assert_eq!(rebound.amount, Some(Money::new(400)));
    assert_eq!(rebound.status, TokenStatus::Bound);

    assert_eq!(
        h.engine
            .bind_token(&token, intruder.id, Money::new(10))
            .await,
        Err(EngineError::AlreadyBound(token.clone()))
    );

    let own = h.engine.issue_token(sender.id).await.unwrap().token;
    assert_eq!(
        h.engine
            .bind_token(&own, sender.id, Money::new(10))
            .await
            .unwrap_err()
            .kind(),
        ErrorKind::Validation
    );
    assert_eq!(
        h.engine
            .bind_token(&own, receiver.id, Money::ZERO)
            .await
            .unwrap_err()
            .kind(),
        ErrorKind::Validation
    );
    assert_eq!(
        h.engine
            .bind_token(&own, receiver.id, Money::new(5_000))
            .await
            .unwrap_err()
            .kind(),
        ErrorKind::InsufficientFunds
    );
}

#[tokio::test]
async fn transfer_scenario_moves_funds_once() {
    let h = harness().await;
    let (sender, receiver, token) = h.bound_transfer(1_000, 300).await;
    let receiver_before = h.balance(&receiver).await;

    let redeemed = h.engine.authorize(sender.id, &token, "1234").await.unwrap();

    assert_eq!(redeemed.status, TokenStatus::Redeemed);
    assert!(redeemed.redeemed_at.is_some());
    assert_eq!(h.balance(&sender).await, 700);
    assert_eq!(h.balance(&receiver).await, receiver_before + 300);
    assert_eq!(
        h.engine.lookup_token(&token).await.unwrap().unwrap().status,
        TokenStatus::Redeemed
    );

    assert_eq!(
        h.engine.authorize(sender.id, &token, "1234").await,
        Err(EngineError::AlreadyRedeemed(token.clone()))
    );
    assert_eq!(
        h.engine
            .bind_token(&token, receiver.id, Money::new(1))
            .await,
        Err(EngineError::AlreadyRedeemed(token.clone()))
    );
    assert_eq!(h.balance(&sender).await, 700);
}

#[tokio::test]
async fn transfers_conserve_total_balance() {
    let h = harness().await;
    let (sender, receiver, token) = h.bound_transfer(5_000, 1_234).await;
    let total = h.balance(&sender).await + h.balance(&receiver).await;

    h.engine.authorize(sender.id, &token, "1234").await.unwrap();

    assert_eq!(h.balance(&sender).await, 5_000 - 1_234);
    assert_eq!(h.balance(&receiver).await, 1_234);
    assert_eq!(h.balance(&sender).await + h.balance(&receiver).await, total);
}

#[tokio::test]
async fn only_the_sender_can_authorize() {
    let h = harness().await;
    let (sender, receiver, token) = h.bound_transfer(1_000, 300).await;
    h.engine.set_pin(receiver.id, "4321").await.unwrap();

    let err = h
        .engine
        .authorize(receiver.id, &token, "4321")
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Forbidden);
    assert_eq!(h.balance(&sender).await, 1_000);
    assert_eq!(h.balance(&receiver).await, 0);
}

#[tokio::test]
async fn authorize_checks_the_pin() {
    let h = harness().await;
    let (sender, _receiver, token) = h.bound_transfer(1_000, 300).await;

    assert_eq!(
        h.engine.authorize(sender.id, &token, "9999").await,
        Err(EngineError::InvalidPin)
    );

    let other = h.account("nopin@b.com").await;
    assert_eq!(
        h.engine.verify_pin(other.id, "1234").await,
        Err(EngineError::PinNotSet)
    );

    h.engine.set_pin(sender.id, "5678").await.unwrap();
    assert_eq!(h.engine.verify_pin(sender.id, "5678").await, Ok(()));
    assert_eq!(
        h.engine.verify_pin(sender.id, "1234").await,
        Err(EngineError::InvalidPin)
    );
    assert_eq!(h.balance(&sender).await, 1_000);
}

#[tokio::test]
async fn authorizing_an_open_token_is_not_found() {
    let h = harness().await;
    let sender = h.account("a@b.com").await;
    h.engine.set_pin(sender.id, "1234").await.unwrap();
    let token = h.engine.issue_token(sender.id).await.unwrap().token;

    assert_eq!(
        h.engine.authorize(sender.id, &token, "1234").await.unwrap_err().kind(),
        ErrorKind::NotFound
    );
}

#[tokio::test]
async fn insufficient_funds_mutates_nothing() {
    let h = harness().await;
    let (sender, receiver, first) = h.bound_transfer(500, 400).await;
    let second = h.engine.issue_token(sender.id).await.unwrap().token;
    h.engine
        .bind_token(&second, receiver.id, Money::new(400))
        .await
        .unwrap();

    h.engine.authorize(sender.id, &first, "1234").await.unwrap();
    let err = h
        .engine
        .authorize(sender.id, &second, "1234")
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InsufficientFunds);
    assert_eq!(h.balance(&sender).await, 100);
    assert_eq!(h.balance(&receiver).await, 400);
    assert_eq!(
        h.engine.lookup_token(&second).await.unwrap().unwrap().status,
        TokenStatus::Bound
    );
}

// `sqlite::memory:` pools a single connection, so the store transactions
// queue rather than overlap. This covers the losing compare-and-set seeing
// zero rows, not interleaved statements.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_authorizations_redeem_once() {
    let h = harness().await;
    let (sender, receiver, token) = h.bound_transfer(1_000, 300).await;
    let sender_id = sender.id;

    let attempts: Vec<_> = (0..8)
        .map(|_| {
            let engine = Arc::clone(&h.engine);
            let token = token.clone();
            tokio::spawn(async move { engine.authorize(sender_id, &token, "1234").await })
        })
        .collect();

    let mut successes = 0;
    for attempt in attempts {
        match attempt.await.unwrap() {
            Ok(_) => successes += 1,
            Err(err) => assert!(
                matches!(
                    err,
                    EngineError::AlreadyRedeemed(_) | EngineError::TokenNotFound(_)
                ),
                "unexpected error: {err}"
            ),
        }
    }

    assert_eq!(successes, 1);
    assert_eq!(h.balance(&sender).await, 700);
    assert_eq!(h.balance(&receiver).await, 300);
}

#[tokio::test]
async fn funding_is_applied_once_per_reference() {
    let h = harness().await;
    let account = h.account("a@b.com").await;
    h.gateway.settle("ref-1", "success", 25_000);

    assert_eq!(
        h.engine.reconcile_top_up("ref-1", account.id).await,
        Ok(TopUpOutcome::Credited {
            amount: Money::new(25_000)
        })
    );
    assert_eq!(
        h.engine.reconcile_top_up("ref-1", account.id).await,
        Err(EngineError::DuplicateReference("ref-1".to_string()))
    );

    assert_eq!(h.balance(&account).await, 25_000);
    assert_eq!(h.count("funding_references").await, 1);
    assert_eq!(h.count("authorization_codes").await, 1);
}

#[tokio::test]
async fn variant_spellings_of_a_reference_are_not_credited_again() {
    let h = harness().await;
    let account = h.account("a@b.com").await;
    h.gateway.settle("REF123", "success", 50_000);
    h.engine
        .reconcile_top_up("REF123", account.id)
        .await
        .unwrap();

    for variant in ["x/../REF123", "REF123#b", "REF123?a", "ref123", " REF123 "] {
        let err = h
            .engine
            .reconcile_top_up(variant, account.id)
            .await
            .unwrap_err();
        assert!(
            matches!(
                err,
                EngineError::Validation(_) | EngineError::DuplicateReference(_)
            ),
            "{variant}: {err}"
        );
    }

    assert_eq!(h.balance(&account).await, 50_000);
    assert_eq!(h.count("funding_references").await, 1);
}

#[tokio::test]
async fn top_ups_list_credited_references_only() {
    let h = harness().await;
    let account = h.account("a@b.com").await;
    let other = h.account("c@d.com").await;
    h.gateway.settle("ref-a", "success", 1_000);
    h.gateway.settle("ref-b", "ongoing", 2_000);
    h.gateway.settle("ref-c", "success", 3_000);

    h.engine.reconcile_top_up("ref-a", account.id).await.unwrap();
    h.engine.reconcile_top_up("ref-b", account.id).await.unwrap();
    h.engine.reconcile_top_up("ref-c", other.id).await.unwrap();

    let top_ups = h.engine.top_ups(account.id).await.unwrap();
    assert_eq!(top_ups.len(), 1);
    assert_eq!(top_ups[0].reference, "ref-a");
    assert_eq!(top_ups[0].account_id, account.id);
    assert_eq!(top_ups[0].amount, Money::new(1_000));

    assert_eq!(
        h.engine.top_ups(Uuid::new_v4()).await.unwrap_err().kind(),
        ErrorKind::NotFound
    );
}

fn visa(cvv: &str) -> NewCard {
    NewCard {
        number: "4242 4242 4242 4242".to_string(),
        cvv: cvv.to_string(),
        expiry_month: "08".to_string(),
        expiry_year: "2099".to_string(),
    }
}

#[tokio::test]
async fn cards_are_kept_masked_and_per_account() {
    let h = harness().await;
    let account = h.account("a@b.com").await;
    let other = h.account("c@d.com").await;

    let card = h.engine.add_card(account.id, &visa("123")).await.unwrap();
    assert_eq!(card.masked_number, "************4242");
    assert_eq!((card.expiry_month, card.expiry_year), (8, 2099));

    let cards = h.engine.cards(account.id).await.unwrap();
    assert_eq!(cards.len(), 1);
    assert_eq!(cards[0].id, card.id);
    assert_eq!(cards[0].masked_number, card.masked_number);
    assert!(h.engine.cards(other.id).await.unwrap().is_empty());

    let columns = h
        .db
        .query_all(Statement::from_string(
            h.db.get_database_backend(),
            "SELECT name FROM pragma_table_info('cards')",
        ))
        .await
        .unwrap();
    let columns: Vec<String> = columns
        .iter()
        .map(|row| row.try_get("", "name").unwrap())
        .collect();
    assert!(!columns.iter().any(|name| name.contains("cvv")), "{columns:?}");
}

#[tokio::test]
async fn invalid_cards_are_not_stored() {
    let h = harness().await;
    let account = h.account("a@b.com").await;

    let mut bad_number = visa("123");
    bad_number.number = "4242 4242 4242 4241".to_string();
    let mut expired = visa("123");
    expired.expiry_year = "2001".to_string();

    for card in [visa(""), bad_number, expired] {
        let err = h.engine.add_card(account.id, &card).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation, "{err}");
    }
    assert_eq!(h.count("cards").await, 0);

    assert_eq!(
        h.engine
            .add_card(Uuid::new_v4(), &visa("123"))
            .await
            .unwrap_err()
            .kind(),
        ErrorKind::NotFound
    );
}

#[tokio::test]
async fn pending_top_up_can_be_retried() {
    let h = harness().await;
    let account = h.account("a@b.com").await;
    h.gateway.settle("ref-2", "ongoing", 10_000);

    assert_eq!(
        h.engine.reconcile_top_up("ref-2", account.id).await,
        Ok(TopUpOutcome::Pending {
            status: "ongoing".to_string()
        })
    );
    assert_eq!(h.balance(&account).await, 0);
    assert_eq!(h.count("funding_references").await, 0);

    h.gateway.settle("ref-2", "success", 10_000);
    h.engine
        .reconcile_top_up("ref-2", account.id)
        .await
        .unwrap();
    assert_eq!(h.balance(&account).await, 10_000);
}

#[tokio::test]
async fn gateway_failure_writes_nothing() {
    let h = harness().await;
    let account = h.account("a@b.com").await;

    let err = h
        .engine
        .reconcile_top_up("unknown-ref", account.id)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ExternalServiceFailure);
    assert_eq!(h.count("funding_references").await, 0);
    assert_eq!(h.balance(&account).await, 0);
}

#[tokio::test]
async fn init_top_up_returns_access_code() {
    let h = harness().await;
    let account = h.account("a@b.com").await;

    assert_eq!(
        h.engine
            .init_top_up(account.id, Money::new(5_000))
            .await
            .unwrap(),
        "access-a@b.com-5000"
    );
    assert_eq!(
        h.engine
            .init_top_up(account.id, Money::new(-1))
            .await
            .unwrap_err()
            .kind(),
        ErrorKind::Validation
    );
}

#[tokio::test]
async fn history_lists_completed_transfers_for_both_parties() {
    let h = harness().await;
    let (sender, receiver, token) = h.bound_transfer(1_000, 300).await;
    let pending = h.engine.issue_token(sender.id).await.unwrap().token;
    h.engine
        .bind_token(&pending, receiver.id, Money::new(50))
        .await
        .unwrap();
    let outsider = h.account("o@b.com").await;

    h.engine.authorize(sender.id, &token, "1234").await.unwrap();

    let sent = h.engine.history(sender.id).await.unwrap();
    let received = h.engine.history(receiver.id).await.unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].token, token);
    assert_eq!(sent[0].receiver.as_ref().map(|p| p.id), Some(receiver.id));
    assert_eq!(received, sent);
    assert!(h.engine.history(outsider.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn token_details_are_private_to_the_parties() {
    let h = harness().await;
    let (sender, receiver, token) = h.bound_transfer(1_000, 300).await;
    let outsider = h.account("o@b.com").await;

    assert!(h.engine.token_for(sender.id, &token).await.is_ok());
    assert!(h.engine.token_for(receiver.id, &token).await.is_ok());
    assert_eq!(
        h.engine
            .token_for(outsider.id, &token)
            .await
            .unwrap_err()
            .kind(),
        ErrorKind::Forbidden
    );
}
