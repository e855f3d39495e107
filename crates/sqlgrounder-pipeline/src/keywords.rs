//! Static per-module keyword table fed to the module router.
//!
//! These are deliberately coarse: the router only uses them as one signal
//! among several, blended with embedding similarity against module
//! centroids fetched from the rag store. A new deployment's schema decides
//! its own module names and keyword sets; this table ships a generic
//! ERP-shaped starting point that a caller is free to override by building
//! its own `BTreeMap` and passing it straight to
//! [`sqlgrounder_retrieval::route_modules`] instead of going through
//! [`default_keyword_table`].

use std::collections::BTreeMap;

use sqlgrounder_core::Module;

/// A generic keyword table for the modules a typical line-of-business ERP
/// schema is split into. Callers with a different module taxonomy should
/// build their own table rather than extend this one.
pub fn default_keyword_table() -> BTreeMap<Module, Vec<String>> {
    let mut table = BTreeMap::new();

    table.insert(
        Module::new("hr"),
        strings(&[
            "employee", "employees", "staff", "payroll", "salary", "hire", "department",
            "manager", "headcount", "attrition", "onboarding", "pto", "timesheet",
        ]),
    );
    table.insert(
        Module::new("finance"),
        strings(&[
            "invoice", "invoices", "payment", "ledger", "account", "accounts", "budget",
            "expense", "revenue", "journal", "tax", "currency", "reconciliation",
        ]),
    );
    table.insert(
        Module::new("sales"),
        strings(&[
            "order", "orders", "customer", "customers", "quote", "opportunity", "lead",
            "deal", "pipeline", "commission", "discount", "contract",
        ]),
    );
    table.insert(
        Module::new("inventory"),
        strings(&[
            "inventory", "stock", "warehouse", "sku", "shipment", "reorder", "supplier",
            "purchase", "backorder", "bin", "pallet",
        ]),
    );
    table.insert(
        Module::new("logistics"),
        strings(&[
            "shipping", "delivery", "carrier", "tracking", "freight", "route", "dispatch",
            "fleet", "driver",
        ]),
    );
    table.insert(
        Module::new("support"),
        strings(&[
            "ticket", "tickets", "case", "complaint", "escalation", "sla", "resolution",
            "agent", "queue",
        ]),
    );

    table
}

fn strings(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| (*w).to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_module_has_at_least_one_keyword() {
        for (module, keywords) in default_keyword_table() {
            assert!(!keywords.is_empty(), "module {module:?} has no keywords");
        }
    }

    #[test]
    fn table_has_no_duplicate_modules() {
        let table = default_keyword_table();
        let modules: Vec<&Module> = table.keys().collect();
        let mut sorted = modules.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(modules.len(), sorted.len());
    }
}
