mod common;

use std::collections::HashSet;

use anyhow::Result;
use common::{backends, ctx, seed};
use ledger_service::application::{AppError, TransactionQuery};
use ledger_service::domain::{
    CurrencyBalance, PageError, TransactionRequest, UserIdPolicy, ValidationError,
};
use ledger_service::storage::StoreError;
use uuid::Uuid;

#[tokio::test]
async fn test_create_then_get_round_trip() -> Result<()> {
    for backend in backends(UserIdPolicy::Opaque).await? {
        let service = &backend.service;

        for (amount, currency) in [(10050, "usd"), (-14250, "usd"), (0, "loyalty_points")] {
            let request = TransactionRequest::new("user123", amount as f64, currency);
            let created = service.create_transaction(&ctx(), &request).await?;

            let fetched = service
                .get_transaction(&ctx(), &created.id.to_string())
                .await?;

            assert_eq!(fetched, created, "{}", backend.name);
            assert_eq!(fetched.user_id, "user123");
            assert_eq!(fetched.amount, amount);
            assert_eq!(fetched.currency, currency);
        }
    }
    Ok(())
}

#[tokio::test]
async fn test_get_unknown_id_is_not_found() -> Result<()> {
    for backend in backends(UserIdPolicy::Opaque).await? {
        let id = "550e8400-e29b-41d4-a716-446655440000";

        let err = backend
            .service
            .get_transaction(&ctx(), id)
            .await
            .unwrap_err();

        assert_eq!(
            err,
            AppError::Store(StoreError::NotFound(Uuid::parse_str(id)?)),
            "{}",
            backend.name
        );
        assert!(err.is_client_error());
    }
    Ok(())
}

#[tokio::test]
async fn test_get_malformed_id_is_invalid() -> Result<()> {
    for backend in backends(UserIdPolicy::Opaque).await? {
        let err = backend
            .service
            .get_transaction(&ctx(), "not-a-uuid")
            .await
            .unwrap_err();

        assert_eq!(
            err,
            AppError::Store(StoreError::InvalidId("not-a-uuid".to_string())),
            "{}",
            backend.name
        );
    }
    Ok(())
}

#[tokio::test]
async fn test_balance_of_credit_and_debit() -> Result<()> {
    for backend in backends(UserIdPolicy::Opaque).await? {
        seed(&backend.service, "u1", "usd", &[10050, -4250]).await?;

        let balance = backend.service.get_balance(&ctx(), "u1", "usd").await?;

        assert_eq!(balance.balance, 5800, "{}", backend.name);
        assert_eq!(balance.user_id, "u1");
        assert_eq!(balance.currency, "usd");
    }
    Ok(())
}

#[tokio::test]
async fn test_balance_equals_exact_sum() -> Result<()> {
    let amounts = [1445, 495999, 2312, -10050, 20000, -30000, 1233, 0, -1];
    let expected: i64 = amounts.iter().sum();

    for backend in backends(UserIdPolicy::Opaque).await? {
        seed(&backend.service, "u1", "brl", &amounts).await?;

        let balance = backend.service.get_balance(&ctx(), "u1", "brl").await?;

        assert_eq!(balance.balance, expected, "{}", backend.name);
    }
    Ok(())
}

#[tokio::test]
async fn test_balance_is_independent_of_creation_order() -> Result<()> {
    let a: i64 = 6_000_000_000_000_000_000;

    for backend in backends(UserIdPolicy::Opaque).await? {
        let service = &backend.service;
        seed(service, "u1", "usd", &[a, -a, a]).await?;
        seed(service, "u2", "usd", &[a, a, -a]).await?;
        seed(service, "u2", "eur", &[-a, -a, a, 5]).await?;

        let first = service.get_balance(&ctx(), "u1", "usd").await?;
        let second = service.get_balance(&ctx(), "u2", "usd").await?;
        let all = service.get_all_balances(&ctx(), "u2").await?;

        assert_eq!(first.balance, a, "{}", backend.name);
        assert_eq!(second.balance, a, "{}", backend.name);
        assert_eq!(
            all,
            vec![
                CurrencyBalance { currency: "eur".into(), balance: 5 - a },
                CurrencyBalance { currency: "usd".into(), balance: a },
            ],
            "{}",
            backend.name
        );
    }
    Ok(())
}

#[tokio::test]
async fn test_empty_user_is_not_an_error() -> Result<()> {
    for backend in backends(UserIdPolicy::Opaque).await? {
        let service = &backend.service;
        seed(service, "someone_else", "usd", &[100]).await?;

        let listed = service
            .list_transactions(&ctx(), &TransactionQuery::for_user("nobody"))
            .await?;
        let balances = service.get_all_balances(&ctx(), "nobody").await?;
        let balance = service.get_balance(&ctx(), "nobody", "usd").await?;

        assert!(listed.is_empty(), "{}", backend.name);
        assert!(balances.is_empty(), "{}", backend.name);
        assert_eq!(balance.balance, 0, "{}", backend.name);
    }
    Ok(())
}

#[tokio::test]
async fn test_pagination_windows_cover_list_exactly() -> Result<()> {
    for backend in backends(UserIdPolicy::Opaque).await? {
        let service = &backend.service;
        seed(service, "u1", "usd", &[100, 200, 300, 400, 500]).await?;

        let mut paged = Vec::new();
        for offset in [0, 2, 4] {
            let query = TransactionQuery::for_user("u1").currency("usd").page(2, offset);
            let page = service.list_transactions(&ctx(), &query).await?;
            assert!(page.len() <= 2);
            paged.extend(page);
        }

        let amounts: Vec<i64> = paged.iter().map(|t| t.amount).collect();
        assert_eq!(amounts, vec![500, 400, 300, 200, 100], "{}", backend.name);

        let full = service
            .list_transactions(&ctx(), &TransactionQuery::for_user("u1").currency("usd"))
            .await?;
        assert_eq!(paged, full, "{}", backend.name);
    }
    Ok(())
}

#[tokio::test]
async fn test_pagination_never_skips_or_repeats() -> Result<()> {
    let amounts: Vec<i64> = (1..=7).collect();

    for backend in backends(UserIdPolicy::Opaque).await? {
        let service = &backend.service;
        seed(service, "u1", "usd", &amounts).await?;
        seed(service, "u1", "eur", &[1000, 2000]).await?;

        let full = service
            .list_transactions(&ctx(), &TransactionQuery::for_user("u1"))
            .await?;
        assert_eq!(full.len(), 9, "{}", backend.name);

        let mut seen = Vec::new();
        let mut offset = 0;
        loop {
            let query = TransactionQuery::for_user("u1").page(3, offset);
            let page = service.list_transactions(&ctx(), &query).await?;
            if page.is_empty() {
                break;
            }
            offset += page.len() as i64;
            seen.extend(page);
        }

        assert_eq!(seen, full, "{}", backend.name);
        let unique: HashSet<_> = seen.iter().map(|t| t.id).collect();
        assert_eq!(unique.len(), 9);
    }
    Ok(())
}

#[tokio::test]
async fn test_list_is_newest_first() -> Result<()> {
    for backend in backends(UserIdPolicy::Opaque).await? {
        seed(&backend.service, "u1", "usd", &[1, 2, 3, 4]).await?;

        let listed = backend
            .service
            .list_transactions(&ctx(), &TransactionQuery::for_user("u1"))
            .await?;

        for pair in listed.windows(2) {
            assert!(pair[0].timestamp >= pair[1].timestamp, "{}", backend.name);
            assert!(pair[0].sequence > pair[1].sequence, "{}", backend.name);
        }
    }
    Ok(())
}

#[tokio::test]
async fn test_non_positive_limit_returns_all() -> Result<()> {
    for backend in backends(UserIdPolicy::Opaque).await? {
        seed(&backend.service, "u1", "usd", &[1, 2, 3]).await?;

        for limit in [0, -1] {
            let query = TransactionQuery::for_user("u1").page(limit, 1);
            let listed = backend.service.list_transactions(&ctx(), &query).await?;
            assert_eq!(listed.len(), 2, "{} limit {}", backend.name, limit);
        }
    }
    Ok(())
}

#[tokio::test]
async fn test_negative_offset_is_invalid_pagination() -> Result<()> {
    for backend in backends(UserIdPolicy::Opaque).await? {
        let query = TransactionQuery::for_user("u1").page(10, -1);

        let err = backend
            .service
            .list_transactions(&ctx(), &query)
            .await
            .unwrap_err();

        assert_eq!(
            err,
            AppError::Store(StoreError::InvalidPagination(PageError::NegativeOffset(-1))),
            "{}",
            backend.name
        );
    }
    Ok(())
}

#[tokio::test]
async fn test_currency_isolation() -> Result<()> {
    for backend in backends(UserIdPolicy::Opaque).await? {
        let service = &backend.service;
        seed(service, "u1", "usd", &[100, 200]).await?;
        seed(service, "u1", "eur", &[7000]).await?;

        let eur = service
            .list_transactions(&ctx(), &TransactionQuery::for_user("u1").currency("eur"))
            .await?;

        assert_eq!(eur.len(), 1, "{}", backend.name);
        assert!(eur.iter().all(|t| t.currency == "eur"));
        assert_eq!(service.get_balance(&ctx(), "u1", "eur").await?.balance, 7000);
        assert_eq!(service.get_balance(&ctx(), "u1", "usd").await?.balance, 300);
        assert_eq!(service.get_balance(&ctx(), "u1", "gbp").await?.balance, 0);
    }
    Ok(())
}

#[tokio::test]
async fn test_users_are_isolated() -> Result<()> {
    for backend in backends(UserIdPolicy::Opaque).await? {
        let service = &backend.service;
        seed(service, "u1", "usd", &[100]).await?;
        seed(service, "u2", "usd", &[900]).await?;

        let listed = service
            .list_transactions(&ctx(), &TransactionQuery::for_user("u1"))
            .await?;

        assert_eq!(listed.len(), 1, "{}", backend.name);
        assert_eq!(listed[0].user_id, "u1");
        assert_eq!(service.get_balance(&ctx(), "u2", "usd").await?.balance, 900);
    }
    Ok(())
}

#[tokio::test]
async fn test_all_balances_include_zero_net_currencies() -> Result<()> {
    for backend in backends(UserIdPolicy::Opaque).await? {
        let service = &backend.service;
        seed(service, "u1", "usd", &[10050, -4250]).await?;
        seed(service, "u1", "eur", &[300, -300]).await?;
        seed(service, "u1", "reward_tokens", &[42]).await?;

        let balances = service.get_all_balances(&ctx(), "u1").await?;

        assert_eq!(
            balances,
            vec![
                CurrencyBalance { currency: "eur".into(), balance: 0 },
                CurrencyBalance { currency: "reward_tokens".into(), balance: 42 },
                CurrencyBalance { currency: "usd".into(), balance: 5800 },
            ],
            "{}",
            backend.name
        );
    }
    Ok(())
}

#[tokio::test]
async fn test_list_across_currencies() -> Result<()> {
    let currencies = ["usd", "brl", "eur", "loyalty_points", "reward_tokens"];

    for backend in backends(UserIdPolicy::Opaque).await? {
        for currency in currencies {
            seed(&backend.service, "user123", currency, &[10050]).await?;
        }

        let listed = backend
            .service
            .list_transactions(&ctx(), &TransactionQuery::for_user("user123").page(10, 0))
            .await?;

        let found: HashSet<&str> = listed.iter().map(|t| t.currency.as_str()).collect();
        let expected: HashSet<&str> = currencies.into_iter().collect();
        assert_eq!(found, expected, "{}", backend.name);
    }
    Ok(())
}

#[tokio::test]
async fn test_validation_rejects_bad_requests() -> Result<()> {
    let user = "550e8400-e29b-41d4-a716-446655440000";
    let long_currency = "a".repeat(33);
    let cases = [
        (TransactionRequest::new("", 100.0, "usd"), ValidationError::UserIdEmpty),
        (TransactionRequest::new("user123", 100.0, "usd"), ValidationError::UserIdInvalid),
        (TransactionRequest::new(user, 100.0, ""), ValidationError::CurrencyEmpty),
        (TransactionRequest::new(user, 100.0, "USD"), ValidationError::CurrencyInvalid),
        (TransactionRequest::new(user, 100.0, long_currency.as_str()), ValidationError::CurrencyInvalid),
        (TransactionRequest::new(user, f64::NAN, "usd"), ValidationError::AmountInvalid),
        (TransactionRequest::new(user, f64::INFINITY, "usd"), ValidationError::AmountInvalid),
    ];

    for backend in backends(UserIdPolicy::Uuid).await? {
        for (request, expected) in &cases {
            let err = backend
                .service
                .create_transaction(&ctx(), request)
                .await
                .unwrap_err();
            assert_eq!(err, AppError::Validation(expected.clone()), "{}", backend.name);
        }

        // Nothing reached the store.
        let listed = backend
            .service
            .list_transactions(&ctx(), &TransactionQuery::for_user(user))
            .await?;
        assert!(listed.is_empty());
        assert!(backend.service.check_integrity(&ctx()).await?.transaction_count == 0);
    }
    Ok(())
}

#[tokio::test]
async fn test_uuid_policy_accepts_canonical_user() -> Result<()> {
    let user = Uuid::new_v4().to_string();

    for backend in backends(UserIdPolicy::Uuid).await? {
        seed(&backend.service, &user, "usd", &[250]).await?;

        let balance = backend.service.get_balance(&ctx(), &user, "usd").await?;

        assert_eq!(balance.balance, 250, "{}", backend.name);
    }
    Ok(())
}

#[tokio::test]
async fn test_concurrent_creates_sum_exactly() -> Result<()> {
    for backend in backends(UserIdPolicy::Opaque).await? {
        let mut handles = Vec::new();
        for i in 0..25_i64 {
            let service = backend.service.clone();
            handles.push(tokio::spawn(async move {
                let amount = if i % 3 == 0 { -i * 7 } else { i * 11 };
                let request = TransactionRequest::new("u1", amount as f64, "usd");
                service
                    .create_transaction(&common::ctx(), &request)
                    .await
                    .map(|_| amount)
            }));
        }

        let mut expected = 0;
        for handle in handles {
            expected += handle.await??;
        }

        let balance = backend.service.get_balance(&ctx(), "u1", "usd").await?;
        assert_eq!(balance.balance, expected, "{}", backend.name);

        let listed = backend
            .service
            .list_transactions(&ctx(), &TransactionQuery::for_user("u1"))
            .await?;
        let sequences: HashSet<i64> = listed.iter().map(|t| t.sequence).collect();
        let expected: HashSet<i64> = (1..=25).collect();
        assert_eq!(sequences, expected, "{}", backend.name);

        let stats = backend.service.check_integrity(&ctx()).await?;
        assert!(stats.is_healthy(), "{}: {:?}", backend.name, stats);
    }
    Ok(())
}
