//! Confusable-table warnings: a small static list
//! of ERP table pairs that are easy to conflate, surfaced only when the
//! question contains one of the pair's trigger keywords.

use sqlgrounder_core::ConfusableTableWarning;

struct ConfusablePair {
    table: &'static str,
    confuses_with: &'static str,
    triggers: &'static [&'static str],
    hint: &'static str,
}

const CONFUSABLE_PAIRS: &[ConfusablePair] = &[
    ConfusablePair {
        table: "orders",
        confuses_with: "purchase_orders",
        triggers: &["purchase", "po", "vendor"],
        hint: "orders usually means sales orders; check whether the question means purchase_orders instead",
    },
    ConfusablePair {
        table: "invoices",
        confuses_with: "bills",
        triggers: &["bill", "bills", "payable"],
        hint: "invoices are typically receivables; accounts-payable questions may mean bills instead",
    },
    ConfusablePair {
        table: "employees",
        confuses_with: "contractors",
        triggers: &["contractor", "freelance", "1099"],
        hint: "employees excludes contractors; check whether the question means the contractors table",
    },
    ConfusablePair {
        table: "customers",
        confuses_with: "vendors",
        triggers: &["vendor", "supplier"],
        hint: "customers are buyers, not suppliers; vendor/supplier questions likely mean vendors",
    },
    ConfusablePair {
        table: "products",
        confuses_with: "raw_materials",
        triggers: &["raw material", "ingredient", "component"],
        hint: "products are finished goods; raw-material questions likely mean raw_materials",
    },
    ConfusablePair {
        table: "payments",
        confuses_with: "refunds",
        triggers: &["refund", "chargeback", "return"],
        hint: "payments are money received; refund questions likely mean the refunds table",
    },
];

/// For each linked table present in `table_names`, check whether the
/// question text contains one of its confusable-pair's trigger keywords.
#[must_use]
pub fn confusable_warnings(table_names: &[&str], question_lower: &str) -> Vec<ConfusableTableWarning> {
    let mut warnings = Vec::new();
    for pair in CONFUSABLE_PAIRS {
        if !table_names.contains(&pair.table) {
            continue;
        }
        for trigger in pair.triggers {
            if question_lower.contains(trigger) {
                warnings.push(ConfusableTableWarning {
                    table: pair.table.to_string(),
                    confuses_with: pair.confuses_with.to_string(),
                    trigger_keyword: (*trigger).to_string(),
                    hint: pair.hint.to_string(),
                });
                break;
            }
        }
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warns_when_trigger_keyword_present() {
        let warnings = confusable_warnings(&["orders"], "how many purchase orders were placed");
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].confuses_with, "purchase_orders");
    }

    #[test]
    fn no_warning_without_trigger_keyword() {
        let warnings = confusable_warnings(&["orders"], "how many orders were placed last week");
        assert!(warnings.is_empty());
    }

    #[test]
    fn no_warning_for_untracked_table() {
        let warnings = confusable_warnings(&["shipments"], "any vendor question at all");
        assert!(warnings.is_empty());
    }
}
