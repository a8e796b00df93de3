use std::collections::BTreeMap;

use serde::Serialize;

use super::{
    error::{Error, ErrorKind},
    schema::CartLine,
};
use crate::constants::SHOPPING_LIST_TITLE;

/// One merged line of the shopping list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShoppingListLine {
    pub name: String,
    pub measurement_unit: String,
    pub amount: i64,
}

impl ShoppingListLine {
    pub fn label(&self) -> String {
        format!("{} ({})", self.name, self.measurement_unit)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShoppingList {
    pub lines: Vec<ShoppingListLine>,
}

impl ShoppingList {
    /// Merges cart lines by (name, unit) and sums their amounts.
    /// `recipe_count` is the number of recipes in the cart; an empty cart is
    /// reported before any aggregation happens.
    pub fn aggregate<I>(recipe_count: i64, lines: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = CartLine>,
    {
        if recipe_count <= 0 {
            return Err(ErrorKind::EmptyResult.new("Shopping cart is empty."));
        }

        let mut totals: BTreeMap<(String, String), i64> = BTreeMap::new();
        for line in lines {
            *totals
                .entry((line.name, line.measurement_unit))
                .or_insert(0) += i64::from(line.amount);
        }

        Ok(Self {
            lines: totals
                .into_iter()
                .map(|((name, measurement_unit), amount)| ShoppingListLine {
                    name,
                    measurement_unit,
                    amount,
                })
                .collect(),
        })
    }

    pub fn render(&self) -> String {
        let mut document = format!("{SHOPPING_LIST_TITLE}\n\n");
        for line in &self.lines {
            document.push_str(&format!("• {} — {}\n", line.label(), line.amount));
        }
        document
    }
}
