use clap::{Args, Parser, Subcommand};

use stockroom_auth::Role;
use stockroom_inventory::{TransactionKind, UnitType};

#[derive(Parser, Debug)]
#[command(
    name = "stockroom",
    about = "Stockroom: role-scoped inventory ledger",
    version
)]
pub struct Cli {
    /// Role of the acting user: admin, stock_operator or user
    #[arg(long, global = true, env = "STOCKROOM_ROLE", default_value = "user")]
    pub role: Role,

    /// Actor label recorded on ledger rows
    #[arg(long, global = true, env = "STOCKROOM_ACTOR")]
    pub actor: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the ledger tables if missing
    Init,

    /// Add a product; a non-zero opening quantity is booked as received
    AddItem {
        /// Item code
        code: String,

        #[command(flatten)]
        details: DetailsArgs,

        /// Opening on-hand quantity
        #[arg(long, default_value_t = 0)]
        opening_quantity: i64,
    },

    /// Replace the descriptive fields of an item
    EditItem {
        /// Item code
        code: String,

        #[command(flatten)]
        details: DetailsArgs,
    },

    /// Attach an image reference to an item
    AttachImage {
        /// Item code
        code: String,

        /// Opaque image reference (path or URL)
        image: String,
    },

    /// Delete an item that has no ledger rows
    RemoveItem {
        /// Item code
        code: String,
    },

    /// Show one item by code or barcode
    Show {
        /// Item code
        #[arg(required_unless_present = "barcode", conflicts_with = "barcode")]
        code: Option<String>,

        /// Look the item up by barcode instead
        #[arg(long)]
        barcode: Option<String>,
    },

    /// List all items
    List,

    /// List items below the low-stock threshold
    LowStock,

    /// Record one issue/receive transaction
    Record {
        /// Item code
        code: String,

        /// issued or received
        kind: TransactionKind,

        /// Positive quantity
        quantity: i64,

        /// Unit price in minor units (defaults to the item's current price)
        #[arg(long)]
        unit_price: Option<i64>,
    },

    /// Check out a cart of CODE:QTY lines as one bill
    Checkout {
        /// Cart lines, e.g. RICE-5:2
        #[arg(required = true)]
        lines: Vec<String>,

        /// Treat line keys as scanned barcodes instead of item codes
        #[arg(long)]
        barcode: bool,
    },

    /// Estimate months of stock left for an item
    Forecast {
        /// Item code
        code: String,
    },

    /// Monthly issued totals for the current and two previous months
    Trend {
        /// Item codes
        #[arg(required = true)]
        codes: Vec<String>,
    },

    /// Ledger rows, newest first
    History {
        /// Only rows of this item
        #[arg(long)]
        item: Option<String>,

        /// Only rows of this bill (BILL_...)
        #[arg(long)]
        bill: Option<String>,

        /// Page size (max 1000)
        #[arg(long)]
        limit: Option<u32>,

        /// Rows to skip
        #[arg(long)]
        offset: Option<u32>,
    },
}

/// Descriptive item fields shared by add-item and edit-item.
#[derive(Args, Debug, Clone)]
pub struct DetailsArgs {
    #[arg(long)]
    pub description: String,

    #[arg(long)]
    pub category: String,

    /// single_unit or pack
    #[arg(long, default_value = "single_unit")]
    pub unit_type: UnitType,

    /// Units per pack (required for packs, forced to 1 for single units)
    #[arg(long)]
    pub pack_size: Option<i32>,

    /// Weight per unit
    #[arg(long)]
    pub weight: f64,

    /// Price in minor units (e.g. cents)
    #[arg(long)]
    pub price: i64,

    #[arg(long)]
    pub barcode: String,
}

/// Split a `KEY:QTY` cart line. The last colon separates the quantity.
pub fn parse_cart_line(raw: &str) -> Result<(String, i64), String> {
    let (key, qty) = raw
        .rsplit_once(':')
        .ok_or_else(|| format!("cart line '{raw}' must look like KEY:QTY"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("cart line '{raw}' has an empty key"));
    }
    let qty = qty
        .trim()
        .parse::<i64>()
        .map_err(|e| format!("cart line '{raw}': bad quantity ({e})"))?;
    Ok((key.to_string(), qty))
}
