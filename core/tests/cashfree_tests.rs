// tests/cashfree_tests.rs
mod common;
use common::*;
use paysettle::providers::cashfree::{CashfreeConfig, CashfreeProvider, DEFAULT_API_VERSION};
use paysettle::providers::{CustomerContact, PaymentProvider, SessionRequest};
use paysettle::{Error, PaymentState, ProviderKind, ReconciliationEngine, Requester};
use rust_decimal_macros::dec;
use serial_test::serial;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use uuid::Uuid;

const SESSION_TOKEN: &str = "session_cf_stub";

/// Minimal Cashfree stand-in. The first `POST /pg/orders` creates the order but
/// answers only after `first_create_delay`; later creates get the 409 Cashfree
/// returns for a duplicate `order_id`. `GET /pg/orders/{id}` returns the order.
struct CashfreeStub {
  base_url: String,
  creates: Arc<AtomicUsize>,
  lookups: Arc<AtomicUsize>,
}

async fn read_request(stream: &mut TcpStream) -> String {
  let mut buf = Vec::new();
  let mut chunk = [0u8; 4096];
  loop {
    let n = stream.read(&mut chunk).await.unwrap_or(0);
    if n == 0 {
      break;
    }
    buf.extend_from_slice(&chunk[..n]);
    let text = String::from_utf8_lossy(&buf).to_string();
    if let Some(head_end) = text.find("\r\n\r\n") {
      let content_length = text[..head_end]
        .lines()
        .find_map(|line| {
          let (name, value) = line.split_once(':')?;
          name
            .eq_ignore_ascii_case("content-length")
            .then(|| value.trim().parse::<usize>().unwrap_or(0))
        })
        .unwrap_or(0);
      if buf.len() >= head_end + 4 + content_length {
        break;
      }
    }
  }
  String::from_utf8_lossy(&buf).to_string()
}

async fn respond(stream: &mut TcpStream, status: &str, body: &str) {
  let response = format!(
    "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
    body.len()
  );
  let _ = stream.write_all(response.as_bytes()).await;
  let _ = stream.shutdown().await;
}

impl CashfreeStub {
  async fn start(order_id: Uuid, first_create_delay: Duration) -> Self {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    let creates = Arc::new(AtomicUsize::new(0));
    let lookups = Arc::new(AtomicUsize::new(0));
    let order_json =
      format!(r#"{{"order_id":"{order_id}","payment_session_id":"{SESSION_TOKEN}","order_status":"ACTIVE"}}"#);

    let (creates_in, lookups_in) = (creates.clone(), lookups.clone());
    tokio::spawn(async move {
      loop {
        let Ok((mut stream, _)) = listener.accept().await else {
          break;
        };
        let (creates, lookups, order_json) = (creates_in.clone(), lookups_in.clone(), order_json.clone());
        tokio::spawn(async move {
          let request = read_request(&mut stream).await;
          let request_line = request.lines().next().unwrap_or_default().to_string();
          if request_line.starts_with("POST /pg/orders ") {
            if creates.fetch_add(1, Ordering::SeqCst) == 0 {
              tokio::time::sleep(first_create_delay).await;
              respond(&mut stream, "200 OK", &order_json).await;
            } else {
              respond(
                &mut stream,
                "409 Conflict",
                r#"{"message":"order with same id is already present","code":"order_already_exists","type":"invalid_request_error"}"#,
              )
              .await;
            }
          } else if request_line.starts_with(&format!("GET /pg/orders/{order_id} ")) {
            lookups.fetch_add(1, Ordering::SeqCst);
            respond(&mut stream, "200 OK", &order_json).await;
          } else {
            respond(&mut stream, "404 Not Found", r#"{"code":"not_found"}"#).await;
          }
        });
      }
    });

    Self {
      base_url,
      creates,
      lookups,
    }
  }

  fn provider(&self) -> CashfreeProvider {
    CashfreeProvider::new(CashfreeConfig {
      base_url: self.base_url.clone(),
      app_id: "cf_app".to_string(),
      secret_key: CASHFREE_SECRET.to_string(),
      api_version: DEFAULT_API_VERSION.to_string(),
      notify_url: None,
      timeout: Duration::from_secs(5),
    })
    .unwrap()
  }
}

fn contact() -> CustomerContact {
  CustomerContact {
    email: Some("asha@example.com".to_string()),
    phone: Some("9999999999".to_string()),
    ..Default::default()
  }
}

#[tokio::test]
#[serial]
async fn retry_after_late_create_adopts_the_existing_cashfree_order() {
  let h = Harness::new();
  let user = Uuid::new_v4();
  let order = h.hundred_order(user).await;

  // Engine timeout is 100 ms; Cashfree takes 400 ms to confirm the first create.
  let stub = CashfreeStub::start(order.id, Duration::from_millis(400)).await;
  let providers: Vec<Arc<dyn PaymentProvider>> = vec![Arc::new(stub.provider())];
  let engine = ReconciliationEngine::new(h.ledger.clone(), providers, engine_settings()).unwrap();

  let first = engine
    .create_payment_session(ProviderKind::Cashfree, order.id, user, dec!(118), contact())
    .await;
  assert!(matches!(first, Err(Error::Upstream(_))), "unexpected: {first:?}");
  let after_timeout = h.ledger.get_order(order.id, Requester::user(user)).await.unwrap();
  assert_eq!(after_timeout.payment_state(), PaymentState::NoSession);

  let retry = engine
    .create_payment_session(ProviderKind::Cashfree, order.id, user, dec!(118), contact())
    .await
    .unwrap();
  assert!(!retry.reused);
  assert_eq!(retry.session_token, SESSION_TOKEN);
  assert_eq!(retry.provider_order_id, order.id.to_string());
  assert_eq!(stub.creates.load(Ordering::SeqCst), 2);
  assert_eq!(stub.lookups.load(Ordering::SeqCst), 1);

  let stored = h.ledger.get_order(order.id, Requester::user(user)).await.unwrap();
  assert_eq!(stored.payment_state(), PaymentState::SessionCreated);
  assert_eq!(stored.payment_session.unwrap().session_token, SESSION_TOKEN);
}

#[tokio::test]
#[serial]
async fn duplicate_create_resolves_to_the_stored_cashfree_session() {
  setup_tracing();
  let order_id = Uuid::new_v4();
  let stub = CashfreeStub::start(order_id, Duration::ZERO).await;
  let provider = stub.provider();
  let request = SessionRequest {
    order_id,
    amount: dec!(118),
    currency: "INR".to_string(),
    customer: contact(),
    return_url: None,
  };

  let created = provider.create_session(&request).await.unwrap();
  let duplicate = provider.create_session(&request).await.unwrap();
  assert_eq!(created.session_token, SESSION_TOKEN);
  assert_eq!(duplicate.session_token, created.session_token);
  assert_eq!(duplicate.provider_order_id, order_id.to_string());
  assert_eq!(stub.lookups.load(Ordering::SeqCst), 1);
}
