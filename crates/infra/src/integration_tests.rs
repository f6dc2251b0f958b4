//! Integration tests for the ledger service over the in-memory store.
//!
//! Tests: StockLedger → StockStore → StockTransaction
//!
//! Verifies:
//! - Quantity and ledger rows change together or not at all
//! - Oversell and batch failures leave no effects
//! - Concurrent issues never drive quantity negative
//! - Forecast and trend read the booked history

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{DateTime, TimeZone, Utc};
    use proptest::prelude::*;

    use stockroom_analytics::MonthsLeft;
    use stockroom_core::{ItemCode, LedgerError};
    use stockroom_inventory::{
        ItemDetails, NewItem, ScanLine, TransactionKind, TransactionRequest, UnitType,
        ledger_balance,
    };

    use crate::config::LedgerConfig;
    use crate::ledger::StockLedger;
    use crate::store::{HistoryQuery, InMemoryStockStore, StockStore, StockTransaction};

    type Ledger = StockLedger<InMemoryStockStore>;

    fn code(s: &str) -> ItemCode {
        s.parse().unwrap()
    }

    fn details(barcode: &str, price: i64) -> ItemDetails {
        ItemDetails {
            description: "Whole wheat flour".to_string(),
            category: "Grocery".to_string(),
            unit_type: UnitType::SingleUnit,
            pack_size: None,
            weight: 1.0,
            price,
            barcode: barcode.to_string(),
        }
    }

    fn new_item(code_str: &str, barcode: &str, opening_quantity: i64) -> NewItem {
        NewItem {
            code: code(code_str),
            details: details(barcode, 1000),
            opening_quantity,
        }
    }

    fn setup() -> Ledger {
        StockLedger::new(InMemoryStockStore::new())
    }

    async fn with_item(ledger: &Ledger, code_str: &str, opening: i64) -> ItemCode {
        let barcode = format!("BC-{code_str}");
        ledger
            .create_item(new_item(code_str, &barcode, opening), Some("admin"))
            .await
            .unwrap()
            .code
    }

    /// Book a movement at an explicit timestamp, bypassing the service clock.
    async fn book(
        store: &InMemoryStockStore,
        item: &ItemCode,
        kind: TransactionKind,
        quantity: i64,
        at: DateTime<Utc>,
    ) {
        let request = TransactionRequest::new(item.clone(), quantity, kind, 100);
        let mut tx = store.begin().await.unwrap();
        let remaining = tx.adjust_quantity(item, request.delta()).await.unwrap();
        tx.append_entry(request.to_entry(remaining, at, None))
            .await
            .unwrap();
        tx.commit().await.unwrap();
    }

    fn utc(year: i32, month: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, day, 10, 0, 0).unwrap()
    }

    // ---- Ledger appender ----

    #[tokio::test]
    async fn received_on_stock_three_leaves_eight_with_one_new_entry() {
        let ledger = setup();
        let item = with_item(&ledger, "RICE-1", 3).await;
        let before = ledger.store().entries().await.len();

        let entry = ledger
            .record_transaction(TransactionRequest::received(item.clone(), 5, 1000).with_actor("op-1"))
            .await
            .unwrap();

        assert_eq!(entry.remaining_after, 8);
        assert_eq!(entry.kind, TransactionKind::Received);
        assert_eq!(entry.updated_by.as_deref(), Some("op-1"));
        assert_eq!(ledger.get_quantity(&item).await.unwrap(), 8);
        assert_eq!(ledger.store().entries().await.len(), before + 1);
    }

    #[tokio::test]
    async fn oversell_fails_without_effects() {
        let ledger = setup();
        let item = with_item(&ledger, "RICE-1", 3).await;
        let before = ledger.store().entries().await;

        let err = ledger
            .record_transaction(TransactionRequest::issued(item.clone(), 4, 1000))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            LedgerError::InsufficientStock {
                item_code: item.clone(),
                requested: 4,
                available: 3,
            }
        );
        assert_eq!(ledger.get_quantity(&item).await.unwrap(), 3);
        assert_eq!(ledger.store().entries().await, before);
    }

    #[tokio::test]
    async fn issuing_exactly_the_stock_reaches_zero() {
        let ledger = setup();
        let item = with_item(&ledger, "RICE-1", 3).await;

        let entry = ledger
            .record_transaction(TransactionRequest::issued(item.clone(), 3, 1000))
            .await
            .unwrap();
        assert_eq!(entry.remaining_after, 0);
    }

    #[tokio::test]
    async fn returned_entry_matches_stored_row_at_microsecond_precision() {
        let ledger = setup();
        let item = with_item(&ledger, "RICE-1", 3).await;

        let entry = ledger
            .record_transaction(TransactionRequest::received(item.clone(), 2, 1000))
            .await
            .unwrap();

        assert_eq!(entry.occurred_at.timestamp_subsec_nanos() % 1_000, 0);
        let stored = ledger.history(&HistoryQuery::for_item(item)).await.unwrap();
        assert_eq!(stored[0], entry);
    }

    #[tokio::test]
    async fn receiving_past_i64_is_invalid_input() {
        let ledger = setup();
        let item = with_item(&ledger, "RICE-1", 5).await;

        let err = ledger
            .record_transaction(TransactionRequest::received(item.clone(), i64::MAX, 0))
            .await
            .unwrap_err();

        assert_eq!(err.code(), "invalid_input");
        assert_eq!(ledger.get_quantity(&item).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn unknown_item_and_bad_input_are_rejected() {
        let ledger = setup();

        let err = ledger
            .record_transaction(TransactionRequest::received(code("GHOST"), 1, 10))
            .await
            .unwrap_err();
        assert_eq!(err, LedgerError::NotFound(code("GHOST")));

        let item = with_item(&ledger, "RICE-1", 3).await;
        for bad in [
            TransactionRequest::issued(item.clone(), 0, 10),
            TransactionRequest::issued(item.clone(), -1, 10),
            TransactionRequest::received(item.clone(), 1, -10),
        ] {
            assert!(matches!(
                ledger.record_transaction(bad).await,
                Err(LedgerError::InvalidInput(_))
            ));
        }
        assert_eq!(ledger.store().entries().await.len(), 1);
        assert!(matches!(
            ledger.get_quantity(&code("GHOST")).await,
            Err(LedgerError::NotFound(_))
        ));
    }

    // ---- Batch processor ----

    #[tokio::test]
    async fn batch_failing_at_third_of_five_leaves_no_effects() {
        let ledger = setup();
        let a = with_item(&ledger, "A", 10).await;
        let b = with_item(&ledger, "B", 10).await;
        let c = with_item(&ledger, "C", 1).await;
        let before = ledger.store().entries().await;

        let err = ledger
            .apply_batch(vec![
                TransactionRequest::issued(a.clone(), 2, 100),
                TransactionRequest::issued(b.clone(), 3, 200),
                TransactionRequest::issued(c.clone(), 5, 300),
                TransactionRequest::issued(a.clone(), 1, 100),
                TransactionRequest::received(b.clone(), 4, 0),
            ])
            .await
            .unwrap_err();

        match &err {
            LedgerError::CartLine { line, item_code, source } => {
                assert_eq!(*line, 2);
                assert_eq!(*item_code, c);
                assert!(matches!(**source, LedgerError::InsufficientStock { .. }));
            }
            other => panic!("expected cart line error, got {other:?}"),
        }
        assert_eq!(err.code(), "insufficient_stock");

        assert_eq!(ledger.get_quantity(&a).await.unwrap(), 10);
        assert_eq!(ledger.get_quantity(&b).await.unwrap(), 10);
        assert_eq!(ledger.get_quantity(&c).await.unwrap(), 1);
        assert_eq!(ledger.store().entries().await, before);
    }

    #[tokio::test]
    async fn batch_success_returns_total_and_stamps_bill_id() {
        let ledger = setup();
        let a = with_item(&ledger, "A", 10).await;
        let b = with_item(&ledger, "B", 10).await;

        let receipt = ledger
            .apply_batch(vec![
                TransactionRequest::issued(a.clone(), 2, 150),
                TransactionRequest::issued(b.clone(), 3, 1000),
                TransactionRequest::issued(a.clone(), 1, 150),
            ])
            .await
            .unwrap();

        assert_eq!(receipt.total_amount, 2 * 150 + 3 * 1000 + 150);
        assert!(receipt.bill_id.to_string().starts_with("BILL_"));
        assert_eq!(receipt.entries.len(), 3);
        assert!(receipt.entries.iter().all(|e| e.bill_id == Some(receipt.bill_id)));
        // Lines are applied in order: the second issue of A sees the first.
        assert_eq!(receipt.entries[0].remaining_after, 8);
        assert_eq!(receipt.entries[2].remaining_after, 7);

        let billed = ledger
            .history(&HistoryQuery::for_bill(receipt.bill_id))
            .await
            .unwrap();
        assert_eq!(billed.len(), 3);

        let other = ledger
            .apply_batch(vec![TransactionRequest::issued(a.clone(), 1, 150)])
            .await
            .unwrap();
        assert_ne!(other.bill_id, receipt.bill_id);
    }

    #[tokio::test]
    async fn empty_batch_is_invalid() {
        let ledger = setup();
        assert!(matches!(
            ledger.apply_batch(vec![]).await,
            Err(LedgerError::InvalidInput(_))
        ));
        assert!(matches!(
            ledger.scan_checkout(vec![], None).await,
            Err(LedgerError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn scan_checkout_prices_lines_at_current_price() {
        let ledger = setup();
        let item = ledger
            .create_item(
                NewItem {
                    code: code("MILK-1"),
                    details: details("4006381333931", 250),
                    opening_quantity: 6,
                },
                None,
            )
            .await
            .unwrap();

        let receipt = ledger
            .scan_checkout(
                vec![
                    ScanLine { barcode: "4006381333931".into(), quantity: 2 },
                    ScanLine { barcode: " 4006381333931 ".into(), quantity: 1 },
                ],
                Some("till-1"),
            )
            .await
            .unwrap();

        assert_eq!(receipt.total_amount, 3 * 250);
        assert!(receipt.entries.iter().all(|e| e.unit_price == 250));
        assert!(receipt.entries.iter().all(|e| e.updated_by.as_deref() == Some("till-1")));
        assert_eq!(ledger.get_quantity(&item.code).await.unwrap(), 3);

        let before = ledger.store().entries().await;
        let err = ledger
            .scan_checkout(
                vec![
                    ScanLine { barcode: "4006381333931".into(), quantity: 1 },
                    ScanLine { barcode: "0000".into(), quantity: 1 },
                ],
                None,
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unknown barcode"));
        assert_eq!(ledger.store().entries().await, before);
    }

    // ---- Concurrency ----

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_over_issue_never_goes_negative() {
        let ledger = Arc::new(setup());
        let item = with_item(&ledger, "HOT-1", 10).await;

        let mut handles = Vec::new();
        for i in 0..25 {
            let ledger = ledger.clone();
            let item = item.clone();
            handles.push(tokio::spawn(async move {
                ledger
                    .record_transaction(
                        TransactionRequest::issued(item, 1, 100).with_actor(format!("till-{i}")),
                    )
                    .await
            }));
        }

        let mut succeeded = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(entry) => {
                    assert!(entry.remaining_after >= 0);
                    succeeded += 1;
                }
                Err(LedgerError::InsufficientStock { available, .. }) => assert_eq!(available, 0),
                Err(other) => panic!("unexpected error {other:?}"),
            }
        }

        assert_eq!(succeeded, 10);
        assert_eq!(ledger.get_quantity(&item).await.unwrap(), 0);
        let entries = ledger.store().entries().await;
        assert_eq!(ledger_balance(entries.iter().filter(|e| e.item_code == item)), 0);
    }

    // ---- Catalogue ----

    #[tokio::test]
    async fn opening_quantity_is_booked_as_received() {
        let ledger = setup();
        let item = ledger
            .create_item(new_item("OIL-1", "111", 12), Some("admin"))
            .await
            .unwrap();
        assert_eq!(item.quantity, 12);

        let entries = ledger.store().entries().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, TransactionKind::Received);
        assert_eq!(entries[0].remaining_after, 12);
        assert_eq!(entries[0].updated_by.as_deref(), Some("admin"));

        let none = ledger
            .create_item(new_item("OIL-2", "222", 0), None)
            .await
            .unwrap();
        assert_eq!(none.quantity, 0);
        assert_eq!(ledger.store().entries().await.len(), 1);
    }

    #[tokio::test]
    async fn duplicate_code_or_barcode_conflicts() {
        let ledger = setup();
        ledger.create_item(new_item("OIL-1", "111", 5), None).await.unwrap();

        let dup_code = ledger.create_item(new_item("OIL-1", "999", 5), None).await;
        assert!(matches!(dup_code, Err(LedgerError::Conflict(_))));

        let dup_barcode = ledger.create_item(new_item("OIL-2", "111", 5), None).await;
        assert!(matches!(dup_barcode, Err(LedgerError::Conflict(_))));

        assert_eq!(ledger.list_items().await.unwrap().len(), 1);
        assert_eq!(ledger.store().entries().await.len(), 1);
    }

    #[tokio::test]
    async fn editing_details_never_touches_quantity() {
        let ledger = setup();
        let item = with_item(&ledger, "SOAP-1", 7).await;

        let mut edited = details("BC-SOAP-1", 499);
        edited.unit_type = UnitType::Pack;
        edited.pack_size = Some(6);
        let updated = ledger.update_details(&item, edited).await.unwrap();

        assert_eq!(updated.quantity, 7);
        assert_eq!(updated.price, 499);
        assert_eq!(updated.pack_size, 6);

        let with_image = ledger.attach_image(&item, "images/soap-1.png").await.unwrap();
        assert_eq!(with_image.image.as_deref(), Some("images/soap-1.png"));

        assert!(matches!(
            ledger.update_details(&code("NOPE"), details("x", 1)).await,
            Err(LedgerError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn referenced_items_cannot_be_removed() {
        let ledger = setup();
        let used = with_item(&ledger, "USED", 1).await;
        let unused = with_item(&ledger, "UNUSED", 0).await;

        assert!(matches!(
            ledger.remove_item(&used).await,
            Err(LedgerError::Conflict(_))
        ));
        ledger.remove_item(&unused).await.unwrap();
        assert!(matches!(
            ledger.find_item(&unused).await,
            Err(LedgerError::NotFound(_))
        ));
        assert!(matches!(
            ledger.remove_item(&unused).await,
            Err(LedgerError::NotFound(_))
        ));
        assert!(ledger.find_item(&used).await.is_ok());
    }

    #[tokio::test]
    async fn low_stock_uses_configured_threshold() {
        let ledger = StockLedger::with_config(
            InMemoryStockStore::new(),
            LedgerConfig {
                low_stock_threshold: 5,
            },
        );
        with_item(&ledger, "A", 4).await;
        with_item(&ledger, "B", 0).await;
        with_item(&ledger, "C", 5).await;

        let low: Vec<String> = ledger
            .low_stock()
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.code.to_string())
            .collect();
        assert_eq!(low, vec!["B", "A"]);
    }

    #[tokio::test]
    async fn history_is_newest_first_and_paged() {
        let ledger = setup();
        let item = with_item(&ledger, "A", 10).await;
        for qty in 1..=4 {
            ledger
                .record_transaction(TransactionRequest::issued(item.clone(), qty, 10))
                .await
                .unwrap();
        }

        let page = ledger
            .history(&HistoryQuery::for_item(item.clone()).page(Some(2), Some(1)))
            .await
            .unwrap();
        let quantities: Vec<i64> = page.iter().map(|e| e.quantity).collect();
        assert_eq!(quantities, vec![3, 2]);

        let zero = HistoryQuery {
            limit: 0,
            ..HistoryQuery::default()
        };
        assert!(ledger.history(&zero).await.is_err());
    }

    // ---- Forecast & trend ----

    #[tokio::test]
    async fn forecast_over_ten_twenty_thirty_with_stock_hundred() {
        let ledger = setup();
        let item = with_item(&ledger, "FLOUR-1", 0).await;
        let store = ledger.store();

        book(store, &item, TransactionKind::Received, 160, utc(2025, 1, 2)).await;
        book(store, &item, TransactionKind::Issued, 10, utc(2025, 1, 20)).await;
        book(store, &item, TransactionKind::Issued, 20, utc(2025, 2, 20)).await;
        book(store, &item, TransactionKind::Issued, 30, utc(2025, 3, 20)).await;

        let estimate = ledger.estimate_depletion(&item).await.unwrap();
        assert_eq!(estimate.current_stock, 100);
        assert_eq!(estimate.average_monthly_usage, 20);
        assert_eq!(estimate.estimated_months_left, MonthsLeft::Finite(5));
        assert_eq!(estimate.months_observed, 3);
    }

    #[tokio::test]
    async fn receive_only_month_counts_as_zero_usage() {
        let ledger = setup();
        let item = with_item(&ledger, "FLOUR-2", 0).await;
        let store = ledger.store();

        book(store, &item, TransactionKind::Received, 160, utc(2024, 12, 5)).await;
        book(store, &item, TransactionKind::Issued, 10, utc(2025, 1, 20)).await;
        book(store, &item, TransactionKind::Issued, 20, utc(2025, 2, 20)).await;
        book(store, &item, TransactionKind::Issued, 30, utc(2025, 3, 20)).await;

        let estimate = ledger.estimate_depletion(&item).await.unwrap();
        assert_eq!(estimate.months_observed, 4);
        assert_eq!(estimate.average_monthly_usage, 15);
        assert_eq!(estimate.estimated_months_left, MonthsLeft::Finite(6));
    }

    #[tokio::test]
    async fn forecast_edge_cases() {
        let ledger = setup();

        assert!(matches!(
            ledger.estimate_depletion(&code("GHOST")).await,
            Err(LedgerError::NotFound(_))
        ));

        let idle = with_item(&ledger, "IDLE", 0).await;
        let estimate = ledger.estimate_depletion(&idle).await.unwrap();
        assert_eq!(estimate.estimated_months_left, MonthsLeft::Finite(0));

        let stocked = with_item(&ledger, "STOCKED", 40).await;
        let estimate = ledger.estimate_depletion(&stocked).await.unwrap();
        assert_eq!(estimate.average_monthly_usage, 0);
        assert_eq!(estimate.estimated_months_left, MonthsLeft::Unbounded);
    }

    #[tokio::test]
    async fn sales_trend_covers_current_and_two_previous_months() {
        let ledger = setup();
        let a = with_item(&ledger, "A", 0).await;
        let b = with_item(&ledger, "B", 0).await;
        let store = ledger.store();

        book(store, &a, TransactionKind::Received, 500, utc(2025, 1, 1)).await;
        book(store, &b, TransactionKind::Received, 500, utc(2025, 1, 1)).await;
        book(store, &a, TransactionKind::Issued, 99, utc(2025, 1, 25)).await;
        book(store, &a, TransactionKind::Issued, 5, utc(2025, 2, 1)).await;
        book(store, &b, TransactionKind::Issued, 7, utc(2025, 3, 10)).await;
        book(store, &a, TransactionKind::Issued, 2, utc(2025, 4, 3)).await;
        book(store, &a, TransactionKind::Issued, 3, utc(2025, 4, 9)).await;

        let points = ledger
            .sales_trend(&[a.clone(), b.clone()], utc(2025, 4, 15))
            .await
            .unwrap();

        let months: Vec<String> = points.iter().map(|p| p.month.to_string()).collect();
        assert_eq!(months, vec!["2025-02", "2025-03", "2025-04"]);
        assert_eq!(points[0].totals.get(&a), Some(&5));
        assert_eq!(points[1].totals.get(&b), Some(&7));
        assert_eq!(points[2].totals.get(&a), Some(&5));

        assert!(matches!(
            ledger.sales_trend(&[], utc(2025, 4, 15)).await,
            Err(LedgerError::InvalidInput(_))
        ));
    }

    // ---- Transaction scope ----

    #[tokio::test]
    async fn dropped_transaction_rolls_back() {
        let ledger = setup();
        let item = with_item(&ledger, "A", 4).await;

        {
            let mut tx = ledger.store().begin().await.unwrap();
            assert_eq!(tx.adjust_quantity(&item, 6).await.unwrap(), 10);
        }

        assert_eq!(ledger.get_quantity(&item).await.unwrap(), 4);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 64,
            ..ProptestConfig::default()
        })]

        /// Property: after any sequence of single-entry calls, on-hand quantity
        /// equals Σ received − Σ issued over the item's ledger rows, and every
        /// rejected call left the ledger untouched.
        #[test]
        fn quantity_matches_ledger_balance(
            opening in 0i64..50,
            moves in prop::collection::vec((any::<bool>(), 1i64..30), 1..30)
        ) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let (quantity, balance, rows, accepted) = rt.block_on(async {
                let ledger = setup();
                let item = with_item(&ledger, "P-1", opening).await;
                let mut accepted = usize::from(opening > 0);

                for (is_issue, qty) in moves {
                    let kind = if is_issue { TransactionKind::Issued } else { TransactionKind::Received };
                    let request = TransactionRequest::new(item.clone(), qty, kind, 10);
                    match ledger.record_transaction(request).await {
                        Ok(_) => accepted += 1,
                        Err(LedgerError::InsufficientStock { .. }) => {}
                        Err(other) => panic!("unexpected error {other:?}"),
                    }
                }

                let entries = ledger.store().entries().await;
                (
                    ledger.get_quantity(&item).await.unwrap(),
                    ledger_balance(&entries),
                    entries.len(),
                    accepted,
                )
            });

            prop_assert!(quantity >= 0);
            prop_assert_eq!(quantity, balance);
            prop_assert_eq!(rows, accepted);
        }
    }
}
