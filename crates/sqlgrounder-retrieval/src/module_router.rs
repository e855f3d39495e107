//! S1 — classify a question into at most `maxModules` domain modules, using a
//! static per-module keyword table plus cosine similarity against module
//! centroid embeddings fetched from the rag store.

use std::collections::BTreeMap;

use asupersync::Cx;
use sqlgrounder_core::Module;
use sqlgrounder_db::SchemaStore;

use crate::blocking::block_on;

/// One module the router chose, with its blended confidence.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutedModule {
    pub module: Module,
    pub confidence: f64,
}

/// Which signal(s) actually contributed to the routing decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingMethod {
    Keyword,
    Embedding,
    Hybrid,
}

#[derive(Debug, Clone)]
pub struct RouterOutcome {
    pub modules: Vec<RoutedModule>,
    pub method: RoutingMethod,
}

const KEYWORD_WEIGHT: f64 = 0.15;
const KEYWORD_CONFIDENCE_WEIGHT: f64 = 0.20;
const FALLBACK_CONFIDENCE_FLOOR: f64 = 0.30;

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn keyword_hits(text_lower: &str, tokens: &[String], keywords: &[String]) -> usize {
    keywords
        .iter()
        .filter(|kw| {
            let kw_lower = kw.to_lowercase();
            text_lower.contains(&kw_lower) || tokens.iter().any(|t| t == &kw_lower)
        })
        .count()
}

/// Classify `question` into domain modules.
///
/// `keyword_table` maps each known module to its static keyword list; modules
/// absent from the table are still eligible if the rag store's module
/// centroids surface them by cosine similarity alone.
///
/// Never fails: a rag-store error degrades to keyword-only routing.
pub fn route_modules<S: SchemaStore>(
    store: &S,
    cx: &Cx,
    question: &sqlgrounder_core::Question,
    keyword_table: &BTreeMap<Module, Vec<String>>,
    max_modules: usize,
) -> RouterOutcome {
    let text_lower = question.text.to_lowercase();
    let tokens = tokenize(&question.text);

    let mut keyword_scores: BTreeMap<Module, usize> = BTreeMap::new();
    for (module, keywords) in keyword_table {
        let hits = keyword_hits(&text_lower, &tokens, keywords);
        if hits > 0 {
            keyword_scores.insert(module.clone(), hits);
        }
    }
    let total_keyword_hits: usize = keyword_scores.values().sum();

    let fetch_limit = max_modules.saturating_add(2);
    let cosine_result = block_on(store.cosine_modules(cx, &question.question_embedding, fetch_limit));

    let embedding_scores: BTreeMap<Module, f64> = match cosine_result {
        Ok(rows) => rows
            .into_iter()
            .map(|row| (Module::new(row.module), row.similarity))
            .collect(),
        Err(e) => {
            tracing::warn!(error = %e, "module centroid lookup failed, degrading to keyword-only routing");
            BTreeMap::new()
        }
    };

    let method = if embedding_scores.is_empty() {
        RoutingMethod::Keyword
    } else if total_keyword_hits == 0 {
        RoutingMethod::Embedding
    } else {
        RoutingMethod::Hybrid
    };

    let mut candidates: BTreeMap<Module, (f64, f64)> = BTreeMap::new();
    for (module, sim) in &embedding_scores {
        candidates.entry(module.clone()).or_insert((0.0, 0.0)).0 = *sim;
    }
    for (module, hits) in &keyword_scores {
        candidates.entry(module.clone()).or_insert((0.0, 0.0)).1 = *hits as f64;
    }

    let mut scored: Vec<(Module, f64, f64)> = candidates
        .into_iter()
        .map(|(module, (embedding_sim, hits))| {
            let combined = embedding_sim + KEYWORD_WEIGHT * hits;
            let confidence = embedding_sim.max(KEYWORD_CONFIDENCE_WEIGHT * hits);
            (module, combined, confidence)
        })
        .collect();

    scored.sort_by(|(ma, ca, _), (mb, cb, _)| {
        cb.partial_cmp(ca)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| ma.as_str().cmp(mb.as_str()))
    });
    scored.truncate(max_modules);

    let scored: Vec<RoutedModule> = scored
        .into_iter()
        .map(|(module, _combined, confidence)| RoutedModule { module, confidence })
        .collect();

    let top_confidence = scored.first().map_or(0.0, |m| m.confidence);
    if total_keyword_hits == 0 && top_confidence < FALLBACK_CONFIDENCE_FLOOR {
        return RouterOutcome {
            modules: Vec::new(),
            method,
        };
    }

    RouterOutcome {
        modules: scored,
        method,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asupersync::Cx;
    use sqlgrounder_core::Question;
    use sqlgrounder_db::{DbResult, StoredModule};

    struct FakeStore {
        modules: Vec<StoredModule>,
    }

    impl SchemaStore for FakeStore {
        async fn cosine_tables(
            &self,
            _cx: &Cx,
            _embedding: &[f32],
            _limit: usize,
        ) -> DbResult<Vec<sqlgrounder_db::StoredTable>> {
            Ok(Vec::new())
        }

        async fn lexical_tables(
            &self,
            _cx: &Cx,
            _terms: &[String],
            _limit: usize,
        ) -> DbResult<Vec<sqlgrounder_db::StoredTable>> {
            Ok(Vec::new())
        }

        async fn cosine_modules(
            &self,
            _cx: &Cx,
            _embedding: &[f32],
            limit: usize,
        ) -> DbResult<Vec<StoredModule>> {
            Ok(self.modules.iter().take(limit).cloned().collect())
        }

        async fn columns_for_table(
            &self,
            _cx: &Cx,
            _table_name: &str,
        ) -> DbResult<Vec<sqlgrounder_core::ColumnGloss>> {
            Ok(Vec::new())
        }

        async fn fk_edges_for_tables(
            &self,
            _cx: &Cx,
            _table_names: &[String],
        ) -> DbResult<Vec<sqlgrounder_core::FkEdge>> {
            Ok(Vec::new())
        }

        async fn all_fk_edges(&self, _cx: &Cx) -> DbResult<Vec<sqlgrounder_core::FkEdge>> {
            Ok(Vec::new())
        }

        async fn tables_by_name(&self, _cx: &Cx, _table_names: &[String]) -> DbResult<Vec<sqlgrounder_db::StoredTable>> {
            Ok(Vec::new())
        }
    }

    fn question(text: &str) -> Question {
        Question {
            text: text.to_string(),
            question_embedding: vec![0.1, 0.2, 0.3],
        }
    }

    #[test]
    fn keyword_and_embedding_blend_into_hybrid_method() {
        let store = FakeStore {
            modules: vec![StoredModule {
                module: "finance".to_string(),
                similarity: 0.5,
            }],
        };
        let mut keywords = BTreeMap::new();
        keywords.insert(Module::new("finance"), vec!["salary".to_string(), "budget".to_string()]);
        let cx = Cx::for_testing();

        let outcome = route_modules(&store, &cx, &question("what is the total salary budget"), &keywords, 3);

        assert_eq!(outcome.method, RoutingMethod::Hybrid);
        assert_eq!(outcome.modules.len(), 1);
        assert_eq!(outcome.modules[0].module, Module::new("finance"));
    }

    #[test]
    fn no_keyword_hits_and_low_confidence_falls_back_to_empty() {
        let store = FakeStore { modules: Vec::new() };
        let keywords = BTreeMap::new();
        let cx = Cx::for_testing();

        let outcome = route_modules(&store, &cx, &question("tell me something vague"), &keywords, 3);

        assert!(outcome.modules.is_empty());
    }

    #[test]
    fn degrades_to_keyword_only_when_store_errors() {
        struct FailingStore;
        impl SchemaStore for FailingStore {
            async fn cosine_tables(
                &self,
                _cx: &Cx,
                _embedding: &[f32],
                _limit: usize,
            ) -> DbResult<Vec<sqlgrounder_db::StoredTable>> {
                Ok(Vec::new())
            }
            async fn lexical_tables(
                &self,
                _cx: &Cx,
                _terms: &[String],
                _limit: usize,
            ) -> DbResult<Vec<sqlgrounder_db::StoredTable>> {
                Ok(Vec::new())
            }
            async fn cosine_modules(
                &self,
                _cx: &Cx,
                _embedding: &[f32],
                _limit: usize,
            ) -> DbResult<Vec<StoredModule>> {
                Err(sqlgrounder_db::DbError::Internal("down".to_string()))
            }
            async fn columns_for_table(
                &self,
                _cx: &Cx,
                _table_name: &str,
            ) -> DbResult<Vec<sqlgrounder_core::ColumnGloss>> {
                Ok(Vec::new())
            }
            async fn fk_edges_for_tables(
                &self,
                _cx: &Cx,
                _table_names: &[String],
            ) -> DbResult<Vec<sqlgrounder_core::FkEdge>> {
                Ok(Vec::new())
            }
            async fn all_fk_edges(&self, _cx: &Cx) -> DbResult<Vec<sqlgrounder_core::FkEdge>> {
                Ok(Vec::new())
            }

            async fn tables_by_name(&self, _cx: &Cx, _table_names: &[String]) -> DbResult<Vec<sqlgrounder_db::StoredTable>> {
                Ok(Vec::new())
            }
        }

        let mut keywords = BTreeMap::new();
        keywords.insert(Module::new("hr"), vec!["employee".to_string()]);
        let cx = Cx::for_testing();

        let outcome = route_modules(&FailingStore, &cx, &question("list employee names"), &keywords, 3);

        assert_eq!(outcome.method, RoutingMethod::Keyword);
        assert_eq!(outcome.modules[0].module, Module::new("hr"));
    }
}
