use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use tracing::info;

use stockroom_auth::{Permission, Principal, authorize, authorize_all};
use stockroom_core::{BillId, ItemCode};
use stockroom_infra::{Config, Database, HistoryQuery, PostgresStockStore, StockLedger};
use stockroom_inventory::{ItemDetails, NewItem, ScanLine, TransactionRequest};

use crate::cli::{Cli, Commands, DetailsArgs, parse_cart_line};

pub async fn run(cli: Cli) -> Result<()> {
    let principal = Principal::new(
        cli.actor.clone().unwrap_or_else(|| "cli".to_string()),
        cli.role,
    );

    // Authorize before touching the database.
    authorize_all(&principal, &required_permissions(&cli.command))?;

    let config = Config::from_env().context("failed to load configuration")?;
    let db = Database::connect(&config.database)
        .await
        .context("failed to connect to the database")?;

    let ledger = StockLedger::with_config(PostgresStockStore::new(db.pool().clone()), config.ledger);
    let result = dispatch(&db, &ledger, &principal, cli.command).await;

    db.close().await;
    result
}

/// Permissions an operation needs, checked up front.
fn required_permissions(command: &Commands) -> Vec<Permission> {
    match command {
        Commands::Init => vec![Permission::SCHEMA_MANAGE],
        Commands::AddItem { .. } => vec![Permission::ITEMS_CREATE],
        Commands::EditItem { .. } | Commands::AttachImage { .. } => vec![Permission::ITEMS_EDIT],
        Commands::RemoveItem { .. } => vec![Permission::ITEMS_REMOVE],
        Commands::Show { .. } | Commands::List | Commands::LowStock => {
            vec![Permission::ITEMS_READ]
        }
        Commands::Record { unit_price, .. } => {
            let mut perms = vec![Permission::LEDGER_RECORD];
            if unit_price.is_none() {
                perms.push(Permission::ITEMS_READ);
            }
            perms
        }
        Commands::Checkout { .. } => vec![Permission::LEDGER_CHECKOUT],
        Commands::Forecast { .. } => vec![Permission::FORECAST_READ],
        Commands::Trend { .. } => vec![Permission::TREND_READ],
        Commands::History { .. } => vec![Permission::LEDGER_READ],
    }
}

async fn dispatch(
    db: &Database,
    ledger: &StockLedger<PostgresStockStore>,
    principal: &Principal,
    command: Commands,
) -> Result<()> {
    let actor = Some(principal.actor.as_str());

    match command {
        Commands::Init => {
            db.init_schema().await?;
            print_json(&serde_json::json!({ "schema": "ready" }))
        }

        Commands::AddItem {
            code,
            details,
            opening_quantity,
        } => {
            let item = NewItem {
                code: code.parse()?,
                details: details.into_details(),
                opening_quantity,
            };
            print_json(&ledger.create_item(item, actor).await?)
        }

        Commands::EditItem { code, details } => {
            let code: ItemCode = code.parse()?;
            print_json(&ledger.update_details(&code, details.into_details()).await?)
        }

        Commands::AttachImage { code, image } => {
            let code: ItemCode = code.parse()?;
            print_json(&ledger.attach_image(&code, &image).await?)
        }

        Commands::RemoveItem { code } => {
            let code: ItemCode = code.parse()?;
            ledger.remove_item(&code).await?;
            print_json(&serde_json::json!({ "removed": code }))
        }

        Commands::Show { code, barcode } => {
            let item = match (code, barcode) {
                (Some(code), _) => ledger.find_item(&code.parse()?).await?,
                (None, Some(barcode)) => ledger
                    .find_by_barcode(&barcode)
                    .await?
                    .with_context(|| format!("no item carries barcode '{barcode}'"))?,
                (None, None) => anyhow::bail!("either an item code or --barcode is required"),
            };
            print_json(&item)
        }

        Commands::List => print_json(&ledger.list_items().await?),

        Commands::LowStock => print_json(&ledger.low_stock().await?),

        Commands::Record {
            code,
            kind,
            quantity,
            unit_price,
        } => {
            let code: ItemCode = code.parse()?;
            let unit_price = match unit_price {
                Some(price) => price,
                None => ledger.find_item(&code).await?.price,
            };
            let mut request = TransactionRequest::new(code, quantity, kind, unit_price);
            request.actor = actor.map(str::to_string);
            let entry = ledger.record_transaction(request).await?;
            info!(entry_id = %entry.id, remaining_after = entry.remaining_after, "transaction recorded");
            print_json(&entry)
        }

        Commands::Checkout { lines, barcode } => {
            let parsed = lines
                .iter()
                .map(|raw| parse_cart_line(raw).map_err(anyhow::Error::msg))
                .collect::<Result<Vec<_>>>()?;

            let receipt = if barcode {
                let scans = parsed
                    .into_iter()
                    .map(|(barcode, quantity)| ScanLine { barcode, quantity })
                    .collect();
                ledger.scan_checkout(scans, actor).await?
            } else {
                authorize(principal, &Permission::ITEMS_READ)?;
                let mut requests = Vec::with_capacity(parsed.len());
                for (code, quantity) in parsed {
                    let code: ItemCode = code.parse()?;
                    let price = ledger.find_item(&code).await?.price;
                    let mut request = TransactionRequest::issued(code, quantity, price);
                    request.actor = actor.map(str::to_string);
                    requests.push(request);
                }
                ledger.apply_batch(requests).await?
            };
            info!(bill_id = %receipt.bill_id, total_amount = receipt.total_amount, "checkout complete");
            print_json(&receipt)
        }

        Commands::Forecast { code } => {
            print_json(&ledger.estimate_depletion(&code.parse()?).await?)
        }

        Commands::Trend { codes } => {
            let codes = codes
                .iter()
                .map(|c| c.parse::<ItemCode>())
                .collect::<Result<Vec<_>, _>>()?;
            print_json(&ledger.sales_trend(&codes, Utc::now()).await?)
        }

        Commands::History {
            item,
            bill,
            limit,
            offset,
        } => {
            let query = HistoryQuery {
                item_code: item.map(|c| c.parse()).transpose()?,
                bill_id: bill.map(|b| b.parse::<BillId>()).transpose()?,
                ..HistoryQuery::default()
            }
            .page(limit, offset);
            print_json(&ledger.history(&query).await?)
        }
    }
}

impl DetailsArgs {
    fn into_details(self) -> ItemDetails {
        ItemDetails {
            description: self.description,
            category: self.category,
            unit_type: self.unit_type,
            pack_size: self.pack_size,
            weight: self.weight,
            price: self.price,
            barcode: self.barcode,
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("failed to render output")?;
    println!("{rendered}");
    Ok(())
}
