// tests/engine_tests.rs
mod common;
use common::*;
use paysettle::providers::{CustomerContact, PaymentStatus};
use paysettle::{
  Error, PaymentOutcome, PaymentState, ProviderKind, Requester, VerificationChannel, WebhookAck, WebhookDelivery,
};
use rust_decimal_macros::dec;
use serial_test::serial;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use uuid::Uuid;

fn contact() -> CustomerContact {
  CustomerContact {
    email: Some("asha@example.com".to_string()),
    phone: Some("9999999999".to_string()),
    ..Default::default()
  }
}

#[tokio::test]
#[serial]
async fn session_is_stored_once_and_reused() {
  let h = Harness::new();
  let user = Uuid::new_v4();
  let order = h.hundred_order(user).await;

  let handle = h
    .engine
    .create_payment_session(ProviderKind::Cashfree, order.id, user, dec!(118), contact())
    .await
    .unwrap();
  assert!(!handle.reused);
  assert_eq!(handle.provider_order_id, order.id.to_string());
  assert_eq!(handle.amount, dec!(118.00));
  assert_eq!(handle.return_url.as_deref(), Some(format!("https://shop.test/order/{}", order.id).as_str()));

  let again = h
    .engine
    .create_payment_session(ProviderKind::Cashfree, order.id, user, dec!(118), contact())
    .await
    .unwrap();
  assert!(again.reused);
  assert_eq!(again.session_token, handle.session_token);
  assert_eq!(h.cashfree.creates(), 1);

  let stored = h.ledger.get_order(order.id, Requester::user(user)).await.unwrap();
  assert_eq!(stored.payment_state(), PaymentState::SessionCreated);
}

#[tokio::test]
#[serial]
async fn timed_out_session_creation_leaves_no_session_and_retry_succeeds() {
  let h = Harness::new();
  let user = Uuid::new_v4();
  let order = h.hundred_order(user).await;
  h.cashfree.stall_next_creates(1);

  let first = h
    .engine
    .create_payment_session(ProviderKind::Cashfree, order.id, user, dec!(118), contact())
    .await;
  match first {
    Err(err) => {
      assert!(matches!(err, Error::Upstream(_)));
      assert!(err.is_retryable());
    }
    Ok(handle) => panic!("expected a timeout, got {handle:?}"),
  }
  let after_timeout = h.ledger.get_order(order.id, Requester::user(user)).await.unwrap();
  assert_eq!(after_timeout.payment_state(), PaymentState::NoSession);

  let retry = h
    .engine
    .create_payment_session(ProviderKind::Cashfree, order.id, user, dec!(118), contact())
    .await
    .unwrap();
  assert!(!retry.reused);
  assert_eq!(h.cashfree.creates(), 2);

  let stored = h.ledger.get_order(order.id, Requester::user(user)).await.unwrap();
  assert_eq!(stored.payment_state(), PaymentState::SessionCreated);
  assert_eq!(stored.payment_session.unwrap().session_token, retry.session_token);
}

#[tokio::test]
#[serial]
async fn tampered_amount_and_foreign_orders_are_refused_before_the_provider_is_called() {
  let h = Harness::new();
  let user = Uuid::new_v4();
  let order = h.hundred_order(user).await;

  let tampered = h
    .engine
    .create_payment_session(ProviderKind::Cashfree, order.id, user, dec!(1.00), contact())
    .await;
  assert!(matches!(tampered, Err(Error::Validation(_))));

  let foreign = h
    .engine
    .create_payment_session(ProviderKind::Cashfree, order.id, Uuid::new_v4(), dec!(118), contact())
    .await;
  assert!(matches!(foreign, Err(Error::Authorization(_))));

  let missing = h
    .engine
    .create_payment_session(ProviderKind::Cashfree, Uuid::new_v4(), user, dec!(118), contact())
    .await;
  assert!(matches!(missing, Err(Error::NotFound(_))));

  assert_eq!(h.cashfree.creates(), 0);
}

#[tokio::test]
#[serial]
async fn paid_orders_cannot_open_new_sessions() {
  let h = Harness::new();
  let user = Uuid::new_v4();
  let order = h.hundred_order(user).await;
  h.engine
    .handle_provider_webhook(ProviderKind::Cashfree, signed_webhook(order.id, "PAID"))
    .await
    .unwrap();

  let result = h
    .engine
    .create_payment_session(ProviderKind::Razorpay, order.id, user, dec!(118), contact())
    .await;
  assert!(matches!(result, Err(Error::Conflict(_))));
  assert_eq!(h.razorpay.create_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
#[serial]
async fn switching_provider_replaces_the_unpaid_session() {
  let h = Harness::new();
  let user = Uuid::new_v4();
  let order = h.hundred_order(user).await;

  h.engine
    .create_payment_session(ProviderKind::Cashfree, order.id, user, dec!(118), contact())
    .await
    .unwrap();
  let rzp = h
    .engine
    .create_payment_session(ProviderKind::Razorpay, order.id, user, dec!(118.00), contact())
    .await
    .unwrap();
  assert_eq!(rzp.provider_order_id, "order_rzp_1");

  let stored = h.ledger.get_order(order.id, Requester::user(user)).await.unwrap();
  let session = stored.payment_session.unwrap();
  assert_eq!(session.provider, ProviderKind::Razorpay);
  assert_eq!(session.provider_order_id, "order_rzp_1");
}

#[tokio::test]
#[serial]
async fn polled_verification_reports_without_mutating_until_success() {
  let h = Harness::new();
  let user = Uuid::new_v4();
  let order = h.hundred_order(user).await;

  let no_session = h.engine.verify_polled_payment(order.id, user).await;
  assert!(matches!(no_session, Err(Error::Conflict(_))));

  h.engine
    .create_payment_session(ProviderKind::Cashfree, order.id, user, dec!(118), contact())
    .await
    .unwrap();

  let pending = h.engine.verify_polled_payment(order.id, user).await.unwrap();
  assert!(matches!(pending, PaymentOutcome::VerificationPending { .. }));

  h.cashfree.set_status(PaymentStatus::Failed {
    status: "FAILED".to_string(),
  });
  let failed = h.engine.verify_polled_payment(order.id, user).await.unwrap();
  assert_eq!(
    failed,
    PaymentOutcome::VerificationFailed {
      provider_status: "FAILED".to_string()
    }
  );
  let still = h.ledger.get_order(order.id, Requester::user(user)).await.unwrap();
  assert_eq!(still.payment_state(), PaymentState::SessionCreated);

  h.cashfree.set_status(PaymentStatus::Success {
    provider_payment_id: Some("cf_pay_9".to_string()),
    status: "SUCCESS".to_string(),
    payer_email: None,
  });
  match h.engine.verify_polled_payment(order.id, user).await.unwrap() {
    PaymentOutcome::Paid { order, newly_paid } => {
      assert!(newly_paid);
      assert!(order.is_paid);
      let session = order.payment_session.as_ref().unwrap();
      assert_eq!(session.channel, VerificationChannel::ClientVerify);
    }
    other => panic!("expected paid, got {other:?}"),
  }

  let polls_before = h.cashfree.status_calls.load(Ordering::SeqCst);
  match h.engine.verify_polled_payment(order.id, user).await.unwrap() {
    PaymentOutcome::Paid { newly_paid, .. } => assert!(!newly_paid),
    other => panic!("expected paid, got {other:?}"),
  }
  assert_eq!(h.cashfree.status_calls.load(Ordering::SeqCst), polls_before);
}

#[tokio::test]
#[serial]
async fn forged_callback_signatures_never_mark_paid() {
  let h = Harness::new();
  let user = Uuid::new_v4();
  let order = h.hundred_order(user).await;
  let session = h
    .engine
    .create_payment_session(ProviderKind::Razorpay, order.id, user, dec!(118), contact())
    .await
    .unwrap();

  let forged = signed_claim("not-the-secret", &session.provider_order_id, "pay_1");
  let result = h.engine.verify_signed_callback(order.id, user, forged).await;
  assert!(matches!(result, Err(Error::Signature(_))));

  let other_order = signed_claim(RAZORPAY_SECRET, "order_rzp_other", "pay_1");
  let result = h.engine.verify_signed_callback(order.id, user, other_order).await;
  assert!(matches!(result, Err(Error::Signature(_))));

  let stored = h.ledger.get_order(order.id, Requester::user(user)).await.unwrap();
  assert!(!stored.is_paid);

  let genuine = signed_claim(RAZORPAY_SECRET, &session.provider_order_id, "pay_1");
  let stranger = h.engine.verify_signed_callback(order.id, Uuid::new_v4(), genuine.clone()).await;
  assert!(matches!(stranger, Err(Error::Authorization(_))));

  match h.engine.verify_signed_callback(order.id, user, genuine).await.unwrap() {
    PaymentOutcome::Paid { order, newly_paid } => {
      assert!(newly_paid);
      let result = order.payment_result.as_ref().unwrap();
      assert_eq!(result.provider_payment_id.as_deref(), Some("pay_1"));
    }
    other => panic!("expected paid, got {other:?}"),
  }
}

#[tokio::test]
#[serial]
async fn webhook_after_client_verify_changes_nothing() {
  let h = Harness::new();
  let user = Uuid::new_v4();
  let order = h.hundred_order(user).await;
  let session = h
    .engine
    .create_payment_session(ProviderKind::Razorpay, order.id, user, dec!(118), contact())
    .await
    .unwrap();
  let claim = signed_claim(RAZORPAY_SECRET, &session.provider_order_id, "pay_1");
  let paid = match h.engine.verify_signed_callback(order.id, user, claim).await.unwrap() {
    PaymentOutcome::Paid { order, .. } => order,
    other => panic!("expected paid, got {other:?}"),
  };

  let ack = h
    .engine
    .handle_provider_webhook(ProviderKind::Cashfree, signed_webhook(order.id, "PAID"))
    .await
    .unwrap();
  assert_eq!(ack, WebhookAck::AlreadyPaid { order_id: order.id });

  let stored = h.ledger.get_order(order.id, Requester::user(user)).await.unwrap();
  assert_eq!(stored.paid_at, paid.paid_at);
  assert_eq!(stored.payment_result, paid.payment_result);
}

#[tokio::test]
#[serial]
async fn duplicate_webhooks_apply_once() {
  let h = Harness::new();
  let order = h.hundred_order(Uuid::new_v4()).await;

  let first = h
    .engine
    .handle_provider_webhook(ProviderKind::Cashfree, signed_webhook(order.id, "PAID"))
    .await
    .unwrap();
  assert_eq!(first, WebhookAck::Applied { order_id: order.id });
  let paid_at = h.ledger.get_order(order.id, Requester::admin(Uuid::new_v4())).await.unwrap().paid_at;

  let second = h
    .engine
    .handle_provider_webhook(ProviderKind::Cashfree, signed_webhook(order.id, "PAID"))
    .await
    .unwrap();
  assert_eq!(second, WebhookAck::AlreadyPaid { order_id: order.id });
  let stored = h.ledger.get_order(order.id, Requester::admin(Uuid::new_v4())).await.unwrap();
  assert_eq!(stored.paid_at, paid_at);
  assert_eq!(stored.payment_result.unwrap().channel, VerificationChannel::Webhook);
}

#[tokio::test]
#[serial]
async fn unauthentic_or_useless_webhooks_leave_orders_unpaid() {
  let h = Harness::new();
  let order = h.hundred_order(Uuid::new_v4()).await;

  let mut tampered = signed_webhook(order.id, "ACTIVE");
  tampered.body = String::from_utf8(tampered.body).unwrap().replace("ACTIVE", "PAID").into_bytes();
  let result = h.engine.handle_provider_webhook(ProviderKind::Cashfree, tampered).await;
  assert!(matches!(result, Err(Error::Signature(_))));

  let unsigned = WebhookDelivery {
    body: b"{\"order_id\":\"x\"}".to_vec(),
    signature: None,
    timestamp: None,
  };
  let result = h.engine.handle_provider_webhook(ProviderKind::Cashfree, unsigned).await;
  assert!(matches!(result, Err(Error::Signature(_))));

  let ignored = h
    .engine
    .handle_provider_webhook(ProviderKind::Cashfree, signed_webhook(order.id, "ACTIVE"))
    .await
    .unwrap();
  assert_eq!(
    ignored,
    WebhookAck::Ignored {
      order_id: order.id,
      status: "ACTIVE".to_string()
    }
  );

  let unknown = h
    .engine
    .handle_provider_webhook(ProviderKind::Cashfree, signed_webhook(Uuid::new_v4(), "PAID"))
    .await;
  assert!(matches!(unknown, Err(Error::NotFound(_))));

  let wrong_provider = h
    .engine
    .handle_provider_webhook(ProviderKind::Razorpay, signed_webhook(order.id, "PAID"))
    .await;
  assert!(matches!(wrong_provider, Err(Error::Validation(_))));

  let stored = h.ledger.get_order(order.id, Requester::admin(Uuid::new_v4())).await.unwrap();
  assert!(!stored.is_paid);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn racing_webhook_and_client_verify_flip_paid_exactly_once() {
  let h = Arc::new(Harness::new());
  let user = Uuid::new_v4();
  let order = h.hundred_order(user).await;
  h.engine
    .create_payment_session(ProviderKind::Cashfree, order.id, user, dec!(118), contact())
    .await
    .unwrap();
  h.cashfree.set_status(PaymentStatus::Success {
    provider_payment_id: Some("cf_pay_1".to_string()),
    status: "SUCCESS".to_string(),
    payer_email: None,
  });

  let order_id = order.id;
  let mut tasks = Vec::new();
  for i in 0..12 {
    let h = h.clone();
    tasks.push(tokio::spawn(async move {
      if i % 2 == 0 {
        match h.engine.verify_polled_payment(order_id, user).await {
          Ok(PaymentOutcome::Paid { newly_paid, .. }) => newly_paid,
          other => panic!("expected paid, got {other:?}"),
        }
      } else {
        let ack = h
          .engine
          .handle_provider_webhook(ProviderKind::Cashfree, signed_webhook(order_id, "PAID"))
          .await
          .unwrap();
        matches!(ack, WebhookAck::Applied { .. })
      }
    }));
  }

  let mut transitions = 0;
  for task in tasks {
    if task.await.unwrap() {
      transitions += 1;
    }
  }
  assert_eq!(transitions, 1);
  assert!(h.ledger.get_order(order_id, Requester::user(user)).await.unwrap().is_paid);
}

#[tokio::test]
#[serial]
async fn client_config_exposes_the_public_key_only() {
  let h = Harness::new();
  let config = h.engine.provider_b_client_config().unwrap();
  assert_eq!(config.key, RAZORPAY_KEY_ID);
  assert_eq!(config.currency, "INR");
}
