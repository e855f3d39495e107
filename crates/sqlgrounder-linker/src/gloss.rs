//! Column gloss generation: derive a human-readable description,
//! synonym set, and coarse type category for one column from its name and
//! declared SQL type alone — no LLM call, no external lookup.

use std::collections::BTreeSet;

use sqlgrounder_core::{ColumnGloss, FkTarget, TypeHint};

/// Abbreviation expansions applied in both directions: if a snake-case token
/// matches the left side, the right side is added as a synonym, and vice
/// versa.
const ABBREVIATIONS: &[(&str, &str)] = &[
    ("qty", "quantity"),
    ("amt", "amount"),
    ("emp", "employee"),
    ("dept", "department"),
    ("desc", "description"),
    ("addr", "address"),
    ("org", "organization"),
    ("mgr", "manager"),
    ("cust", "customer"),
    ("num", "number"),
    ("pct", "percentage"),
    ("acct", "account"),
    ("cat", "category"),
    ("ref", "reference"),
    ("curr", "currency"),
    ("disc", "discount"),
    ("std", "standard"),
    ("min", "minimum"),
    ("max", "maximum"),
    ("avg", "average"),
    ("tx", "transaction"),
    ("txn", "transaction"),
    ("ord", "order"),
    ("prod", "product"),
    ("inv", "inventory"),
];

/// Exact name → type-hint overrides, checked before suffix/type-family
/// fallback.
const EXACT_NAME_HINTS: &[(&str, TypeHint)] = &[
    ("salary", TypeHint::Monetary),
    ("price", TypeHint::Monetary),
    ("cost", TypeHint::Monetary),
    ("total", TypeHint::Monetary),
    ("balance", TypeHint::Monetary),
    ("revenue", TypeHint::Monetary),
    ("quantity", TypeHint::Quantity),
    ("qty", TypeHint::Quantity),
    ("count", TypeHint::Quantity),
    ("name", TypeHint::NameLabel),
    ("title", TypeHint::NameLabel),
    ("status", TypeHint::StatusEnum),
    ("state", TypeHint::StatusEnum),
    ("category", TypeHint::TypeCategory),
    ("type", TypeHint::TypeCategory),
    ("kind", TypeHint::TypeCategory),
    ("code", TypeHint::Code),
    ("sku", TypeHint::Code),
    ("percentage", TypeHint::Percentage),
    ("percent", TypeHint::Percentage),
    ("rate", TypeHint::Percentage),
];

/// `(suffix, type_hint)` pairs checked in order after the exact-name table.
const SUFFIX_HINTS: &[(&str, TypeHint)] = &[
    ("_id", TypeHint::Identifier),
    ("_date", TypeHint::DateTimestamp),
    ("_at", TypeHint::DateTimestamp),
    ("_time", TypeHint::DateTimestamp),
    ("_amount", TypeHint::Monetary),
    ("_price", TypeHint::Monetary),
    ("_name", TypeHint::NameLabel),
    ("_status", TypeHint::StatusEnum),
    ("_flag", TypeHint::Boolean),
    ("_email", TypeHint::Text),
    ("_addr", TypeHint::Text),
    ("_address", TypeHint::Text),
    ("_code", TypeHint::Code),
    ("_pct", TypeHint::Percentage),
];

fn snake_case_tokens(column_name: &str) -> Vec<String> {
    column_name
        .split('_')
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn type_family_hint(data_type: &str) -> TypeHint {
    let lower = data_type.to_lowercase();
    if lower.contains("bool") {
        TypeHint::Boolean
    } else if lower.contains("date") || lower.contains("time") {
        TypeHint::DateTimestamp
    } else if lower.contains("int")
        || lower.contains("numeric")
        || lower.contains("decimal")
        || lower.contains("float")
        || lower.contains("double")
        || lower.contains("real")
    {
        TypeHint::Quantity
    } else if lower.contains("text") || lower.contains("char") || lower.contains("varchar") {
        TypeHint::Text
    } else {
        TypeHint::General
    }
}

/// Derive `typeHint` via (a) exact name match, else (b) suffix match, else
/// (c) type-family fallback.
#[must_use]
pub fn infer_type_hint(column_name: &str, data_type: &str) -> TypeHint {
    let lower_name = column_name.to_lowercase();

    if let Some((_, hint)) = EXACT_NAME_HINTS.iter().find(|(n, _)| *n == lower_name) {
        return *hint;
    }
    if let Some((_, hint)) = SUFFIX_HINTS.iter().find(|(suffix, _)| lower_name.ends_with(suffix)) {
        return *hint;
    }
    type_family_hint(data_type)
}

/// Synonyms = snake-case tokens ∪ abbreviation-map expansions ∪ the
/// lowercased column name.
#[must_use]
pub fn derive_synonyms(column_name: &str) -> BTreeSet<String> {
    let mut synonyms = BTreeSet::new();
    synonyms.insert(column_name.to_lowercase());

    let tokens = snake_case_tokens(column_name);
    for token in &tokens {
        synonyms.insert(token.clone());
        for (short, long) in ABBREVIATIONS {
            if token == short {
                synonyms.insert((*long).to_string());
            }
            if token == long {
                synonyms.insert((*short).to_string());
            }
        }
    }
    synonyms
}

fn describe(tokens: &[String], type_hint: TypeHint) -> String {
    format!("{} ({type_hint})", tokens.join(" "))
}

/// Build a [`ColumnGloss`] for one column from its name, declared type, and
/// key metadata. No LLM call and no store round-trip: everything is derived
/// statically, which is what makes this stage safe to run on every column of
/// every packet table without a latency budget.
#[must_use]
pub fn generate_gloss(
    column_name: &str,
    data_type: &str,
    is_pk: bool,
    is_fk: bool,
    fk_target: Option<FkTarget>,
) -> ColumnGloss {
    let type_hint = infer_type_hint(column_name, data_type);
    let synonyms = derive_synonyms(column_name);
    let tokens = snake_case_tokens(column_name);
    let base = describe(&tokens, type_hint);

    let description = if is_pk {
        format!("Primary key. {base}")
    } else if let Some(target) = &fk_target {
        format!("Foreign key → {}. {base}", target.table)
    } else {
        base
    };

    ColumnGloss {
        column_name: column_name.to_string(),
        description,
        synonyms,
        type_hint,
        is_pk,
        is_fk,
        fk_target,
        data_type: data_type.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_name_hint_wins_over_type_family() {
        assert_eq!(infer_type_hint("salary", "numeric"), TypeHint::Monetary);
    }

    #[test]
    fn suffix_hint_applies_when_no_exact_match() {
        assert_eq!(infer_type_hint("hired_date", "date"), TypeHint::DateTimestamp);
        assert_eq!(infer_type_hint("is_active_flag", "boolean"), TypeHint::Boolean);
    }

    #[test]
    fn type_family_fallback_for_unknown_name() {
        // No exact-name or suffix match; falls through to the integer
        // type-family default.
        assert_eq!(infer_type_hint("zzz_unmatched", "integer"), TypeHint::Quantity);
    }

    #[test]
    fn synonyms_include_abbreviation_expansions_both_ways() {
        let syn = derive_synonyms("emp_qty");
        assert!(syn.contains("employee"));
        assert!(syn.contains("quantity"));
        assert!(syn.contains("emp"));
        assert!(syn.contains("qty"));
    }

    #[test]
    fn primary_key_description_is_prefixed() {
        let gloss = generate_gloss("id", "integer", true, false, None);
        assert!(gloss.description.starts_with("Primary key."));
    }

    #[test]
    fn foreign_key_description_names_target_table() {
        let target = FkTarget { table: "departments".to_string(), column: "id".to_string() };
        let gloss = generate_gloss("department_id", "integer", false, true, Some(target));
        assert!(gloss.description.contains("Foreign key → departments"));
        assert_eq!(gloss.type_hint, TypeHint::Identifier);
    }
}
