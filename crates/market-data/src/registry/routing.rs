//! Per-exchange provider routing tables.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::Exchange;

/// The ordered providers for one exchange: one primary, any number of
/// backups tried in order after it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RoutingTable {
    pub primary: String,
    #[serde(default)]
    pub backups: Vec<String>,
}

impl RoutingTable {
    pub fn new(primary: &str, backups: &[&str]) -> Self {
        Self {
            primary: primary.to_string(),
            backups: backups.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Primary followed by backups, in failover order.
    pub fn chain(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.primary.as_str()).chain(self.backups.iter().map(String::as_str))
    }
}

/// Routing tables for every configured exchange.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RoutingConfig {
    pub tables: BTreeMap<Exchange, RoutingTable>,
}

impl RoutingConfig {
    pub fn table(&self, exchange: Exchange) -> Option<&RoutingTable> {
        self.tables.get(&exchange)
    }

    pub fn set(&mut self, exchange: Exchange, table: RoutingTable) {
        self.tables.insert(exchange, table);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_order() {
        let table = RoutingTable::new("TUSHARE", &["EASTMONEY", "YAHOO"]);
        let chain: Vec<&str> = table.chain().collect();
        assert_eq!(chain, vec!["TUSHARE", "EASTMONEY", "YAHOO"]);
    }
}
