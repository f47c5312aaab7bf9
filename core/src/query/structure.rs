use chrono::Utc;

use crate::query::doctype::classify_doc_type;
use crate::query::entity::extract_entities;
use crate::query::keytokens::key_tokens;
use crate::query::normalize::normalize;
use crate::query::router::route;
use crate::query::temporal::parse_temporal;
use crate::query::types::{EntityType, StructuredQuery};

/// Runs stages 1-3 of the query pipeline (§4.4) in sequence: normalize, then
/// structure (entities/temporal/doc-type/key-tokens), then route.
pub fn structure_query(original_query: &str) -> StructuredQuery {
    let cleaned_query = normalize(original_query);
    let entities = extract_entities(original_query);
    let temporal = parse_temporal(original_query, Utc::now());
    let doc_type_intent = classify_doc_type(&cleaned_query);
    let key_tokens = key_tokens(&cleaned_query);
    let location_hints = entities
        .iter()
        .filter(|e| e.entity_type == EntityType::Place)
        .map(|e| e.text.clone())
        .collect();

    let router_result = route(original_query, &cleaned_query, &key_tokens);

    StructuredQuery {
        original_query: original_query.to_string(),
        cleaned_query,
        entities,
        temporal,
        doc_type_intent,
        location_hints,
        key_tokens,
        query_class: router_result.query_class,
        query_class_confidence: router_result.router_confidence,
        query_domain: router_result.query_domain,
        query_domain_confidence: router_result.query_domain_confidence,
        semantic_need_score: router_result.semantic_need_score,
        nlu_confidence: router_result.router_confidence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structures_a_natural_language_query() {
        let structured = structure_query("Find John Smith's tax return from 2023");
        assert_eq!(structured.doc_type_intent.as_deref(), Some("tax_document"));
        assert!(structured.temporal.is_some());
        assert!(structured.entities.iter().any(|e| e.text == "John Smith"));
    }
}
