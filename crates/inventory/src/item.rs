use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockroom_core::{ItemCode, LedgerError, LedgerResult};

/// How an item is counted on the shelf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitType {
    SingleUnit,
    Pack,
}

impl UnitType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitType::SingleUnit => "single_unit",
            UnitType::Pack => "pack",
        }
    }
}

impl core::fmt::Display for UnitType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for UnitType {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace([' ', '-'], "_").as_str() {
            "single_unit" | "single" | "unit" => Ok(UnitType::SingleUnit),
            "pack" => Ok(UnitType::Pack),
            other => Err(LedgerError::invalid(format!(
                "unit type must be one of: single_unit, pack (got '{other}')"
            ))),
        }
    }
}

/// A stock-keeping unit as held by the stock store.
///
/// `quantity` is only ever changed by the ledger; every other field is
/// descriptive and may be edited directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub code: ItemCode,
    pub description: String,
    pub category: String,
    pub unit_type: UnitType,
    pub pack_size: i32,
    pub weight: f64,
    /// Price in smallest currency unit (e.g., cents).
    pub price: i64,
    pub barcode: String,
    pub quantity: i64,
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Descriptive fields of an item (everything except code and quantity).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemDetails {
    pub description: String,
    pub category: String,
    pub unit_type: UnitType,
    #[serde(default)]
    pub pack_size: Option<i32>,
    pub weight: f64,
    pub price: i64,
    pub barcode: String,
}

impl ItemDetails {
    /// Validate and normalize the fields.
    ///
    /// Text fields are trimmed and must be non-empty. A single unit always has
    /// a pack size of 1; a pack needs an explicit positive pack size.
    pub fn validated(self) -> LedgerResult<Self> {
        let description = required("description", self.description)?;
        let category = required("category", self.category)?;
        let barcode = required("barcode", self.barcode)?;

        if !self.weight.is_finite() || self.weight <= 0.0 {
            return Err(LedgerError::invalid("weight must be a positive number"));
        }
        if self.price < 0 {
            return Err(LedgerError::invalid("price cannot be negative"));
        }

        let pack_size = match self.unit_type {
            UnitType::SingleUnit => 1,
            UnitType::Pack => match self.pack_size {
                Some(n) if n > 0 => n,
                Some(_) => return Err(LedgerError::invalid("pack size must be positive")),
                None => return Err(LedgerError::invalid("pack size is required for packs")),
            },
        };

        Ok(Self {
            description,
            category,
            unit_type: self.unit_type,
            pack_size: Some(pack_size),
            weight: self.weight,
            price: self.price,
            barcode,
        })
    }

    /// Pack size after validation (1 for single units).
    pub fn effective_pack_size(&self) -> i32 {
        match self.unit_type {
            UnitType::SingleUnit => 1,
            UnitType::Pack => self.pack_size.unwrap_or(1),
        }
    }
}

/// Product-add request.
///
/// `opening_quantity` is booked as a `received` ledger entry in the same store
/// transaction that inserts the item, so on-hand quantity always equals the
/// ledger balance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewItem {
    pub code: ItemCode,
    #[serde(flatten)]
    pub details: ItemDetails,
    #[serde(default)]
    pub opening_quantity: i64,
}

impl NewItem {
    pub fn validated(self) -> LedgerResult<Self> {
        if self.opening_quantity < 0 {
            return Err(LedgerError::invalid("opening quantity cannot be negative"));
        }
        Ok(Self {
            code: self.code,
            details: self.details.validated()?,
            opening_quantity: self.opening_quantity,
        })
    }
}

fn required(field: &str, value: String) -> LedgerResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(LedgerError::invalid(format!("{field} cannot be empty")));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn details(unit_type: UnitType, pack_size: Option<i32>) -> ItemDetails {
        ItemDetails {
            description: " Basmati rice ".to_string(),
            category: "Grocery".to_string(),
            unit_type,
            pack_size,
            weight: 5.0,
            price: 1299,
            barcode: "8901234567890".to_string(),
        }
    }

    #[test]
    fn single_unit_forces_pack_size_of_one() {
        let d = details(UnitType::SingleUnit, Some(12)).validated().unwrap();
        assert_eq!(d.pack_size, Some(1));
        assert_eq!(d.effective_pack_size(), 1);
        assert_eq!(d.description, "Basmati rice");
    }

    #[test]
    fn pack_requires_positive_pack_size() {
        assert!(details(UnitType::Pack, None).validated().is_err());
        assert!(details(UnitType::Pack, Some(0)).validated().is_err());
        let d = details(UnitType::Pack, Some(6)).validated().unwrap();
        assert_eq!(d.effective_pack_size(), 6);
    }

    #[test]
    fn blank_fields_and_bad_numbers_are_rejected() {
        let mut d = details(UnitType::SingleUnit, None);
        d.barcode = "  ".to_string();
        assert!(matches!(d.validated(), Err(LedgerError::InvalidInput(_))));

        let mut d = details(UnitType::SingleUnit, None);
        d.weight = 0.0;
        assert!(d.validated().is_err());

        let mut d = details(UnitType::SingleUnit, None);
        d.price = -1;
        assert!(d.validated().is_err());
    }

    #[test]
    fn negative_opening_quantity_is_rejected() {
        let item = NewItem {
            code: "RICE-5".parse().unwrap(),
            details: details(UnitType::SingleUnit, None),
            opening_quantity: -3,
        };
        assert!(item.validated().is_err());
    }

    #[test]
    fn unit_type_parses_loose_spellings() {
        assert_eq!("Single Unit".parse::<UnitType>().unwrap(), UnitType::SingleUnit);
        assert_eq!("pack".parse::<UnitType>().unwrap(), UnitType::Pack);
        assert!("crate".parse::<UnitType>().is_err());
    }

    #[test]
    fn new_item_reads_flat_json() {
        let item: NewItem = serde_json::from_str(
            r#"{
                "code": "RICE-5",
                "description": "Basmati rice",
                "category": "Grocery",
                "unit_type": "pack",
                "pack_size": 4,
                "weight": 5.0,
                "price": 1299,
                "barcode": "8901234567890",
                "opening_quantity": 20
            }"#,
        )
        .unwrap();
        assert_eq!(item.details.unit_type, UnitType::Pack);
        assert_eq!(item.opening_quantity, 20);
    }
}
