//! Property tests for the closure generator and resolver

use chrono::NaiveDate;
use proptest::prelude::*;
use ratebook::closure;
use ratebook::prelude::*;
use ratebook::resolver::resolve;

fn code(s: &str) -> CurrencyCode {
    s.parse().unwrap()
}

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
}

fn put(store: &InMemoryRateStore, user: UserId, from: &str, to: &str, rate: f64) {
    let edge = RateEdge::authoritative(
        user,
        code(from),
        code(to),
        rate,
        day(),
        RateKind::Manual,
        None,
    )
    .unwrap();
    store.upsert_authoritative(edge).unwrap();
}

/// Rates within a realistic FX range so products stay finite
fn rate_strategy() -> impl Strategy<Value = f64> {
    (1e-4f64..1e4f64).prop_filter("positive finite", |r| r.is_finite() && *r > 0.0)
}

proptest! {
    #[test]
    fn identity_resolves_to_one_without_edges(
        y in 2000i32..2100,
        m in 1u32..=12,
        d in 1u32..=28,
    ) {
        let store = InMemoryRateStore::new();
        let user = UserId::new_v4();
        let date = NaiveDate::from_ymd_opt(y, m, d).unwrap();

        let res = resolve(&store, user, &code("EUR"), &code("EUR"), date).unwrap();
        prop_assert_eq!(res, Resolution::Found(1.0));
    }

    #[test]
    fn reverse_consistency(rate in rate_strategy()) {
        let store = InMemoryRateStore::new();
        let user = UserId::new_v4();
        let active = ActiveCurrencySet::new(vec![code("EUR")], code("USD"));

        put(&store, user, "USD", "EUR", rate);
        closure::generate(&store, user, &active, day()).unwrap();

        let reverse = resolve(&store, user, &code("EUR"), &code("USD"), day())
            .unwrap()
            .rate()
            .unwrap();
        prop_assert!((reverse - 1.0 / rate).abs() <= 1e-9 * (1.0 / rate));
    }

    #[test]
    fn authoritative_reverse_always_wins(
        rate in rate_strategy(),
        manual_reverse in rate_strategy(),
    ) {
        let store = InMemoryRateStore::new();
        let user = UserId::new_v4();
        let active = ActiveCurrencySet::new(vec![code("EUR")], code("USD"));

        put(&store, user, "USD", "EUR", rate);
        put(&store, user, "EUR", "USD", manual_reverse);
        closure::generate(&store, user, &active, day()).unwrap();

        let reverse = resolve(&store, user, &code("EUR"), &code("USD"), day())
            .unwrap()
            .rate()
            .unwrap();
        prop_assert_eq!(reverse, manual_reverse);
    }

    #[test]
    fn transitivity_through_shared_currency(
        a in rate_strategy(),
        b in rate_strategy(),
    ) {
        let store = InMemoryRateStore::new();
        let user = UserId::new_v4();
        let active = ActiveCurrencySet::new(vec![code("EUR"), code("GBP")], code("USD"));

        put(&store, user, "USD", "EUR", a);
        put(&store, user, "EUR", "GBP", b);
        closure::generate(&store, user, &active, day()).unwrap();

        let composed = resolve(&store, user, &code("USD"), &code("GBP"), day())
            .unwrap()
            .rate()
            .unwrap();
        prop_assert!((composed - a * b).abs() <= 1e-9 * (a * b));
    }

    #[test]
    fn closure_is_idempotent(
        a in rate_strategy(),
        b in rate_strategy(),
        c in rate_strategy(),
    ) {
        let store = InMemoryRateStore::new();
        let user = UserId::new_v4();
        let active = ActiveCurrencySet::new(
            vec![code("EUR"), code("GBP"), code("CNY")],
            code("USD"),
        );

        put(&store, user, "USD", "EUR", a);
        put(&store, user, "GBP", "USD", b);
        put(&store, user, "USD", "CNY", c);

        closure::generate(&store, user, &active, day()).unwrap();
        let second = closure::generate(&store, user, &active, day()).unwrap();
        prop_assert!(second.is_noop());
    }

    #[test]
    fn gaps_match_resolver_exactly(
        connect_eur in any::<bool>(),
        connect_cny in any::<bool>(),
    ) {
        let store = InMemoryRateStore::new();
        let registry = CurrencyRegistry::with_defaults();
        let user = UserId::new_v4();
        let active = ActiveCurrencySet::new(vec![code("EUR"), code("CNY")], code("USD"));

        if connect_eur {
            put(&store, user, "USD", "EUR", 0.92);
        }
        if connect_cny {
            put(&store, user, "CNY", "USD", 0.14);
        }
        closure::generate(&store, user, &active, day()).unwrap();

        let gaps = ratebook::gaps::find_gaps(&store, &registry, user, &active, day()).unwrap();
        for currency in active.iter() {
            if currency == active.base() {
                continue;
            }
            let resolvable = resolve(&store, user, currency, active.base(), day())
                .unwrap()
                .is_found();
            let reported = gaps.iter().any(|g| &g.from.code == currency);
            prop_assert_eq!(resolvable, !reported);
        }
    }
}
