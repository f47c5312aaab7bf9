use crate::query::types::{Entity, EntityType};

const PLACE_SUFFIXES: &[&str] = &[
    "street", "st", "avenue", "ave", "road", "rd", "boulevard", "blvd", "city", "county", "park",
    "lake", "mountain", "mountains", "valley", "island", "bay", "beach",
];

const ORG_MARKERS: &[&str] = &[
    "inc", "llc", "corp", "corporation", "company", "co", "ltd", "university", "college",
    "institute", "foundation", "group", "labs", "studios",
];

/// Stage 2 entity extraction. Scans runs of consecutive capitalized tokens in
/// the *original* (unnormalized) query and classifies each run by its
/// trailing word: a place suffix wins, then an organization marker, then a
/// short 2-3 token run is assumed to be a person's name, else it's unclassified.
/// A lone capitalized token at the very start of the query is ignored since it
/// is usually just sentence-initial capitalization, not a named entity.
pub fn extract_entities(original: &str) -> Vec<Entity> {
    if !original.chars().any(|c| c.is_uppercase()) {
        return Vec::new();
    }

    let tokens: Vec<&str> = original.split_whitespace().collect();
    let mut entities = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        if starts_uppercase(clean_token(tokens[i])) {
            let start = i;
            let mut j = i + 1;
            while j < tokens.len() && starts_uppercase(clean_token(tokens[j])) {
                j += 1;
            }
            let run_len = j - start;
            if !(start == 0 && run_len == 1) {
                let text = tokens[start..j].join(" ");
                let entity_type = classify_entity(&tokens[start..j]);
                entities.push(Entity { text, entity_type });
            }
            i = j;
        } else {
            i += 1;
        }
    }
    entities
}

fn clean_token(tok: &str) -> &str {
    tok.trim_matches(|c: char| !c.is_alphanumeric())
}

fn starts_uppercase(s: &str) -> bool {
    s.chars().next().map(|c| c.is_uppercase()).unwrap_or(false)
}

fn classify_entity(run: &[&str]) -> EntityType {
    let last = run.last().map(|t| clean_token(t).to_lowercase()).unwrap_or_default();
    if PLACE_SUFFIXES.contains(&last.as_str()) {
        return EntityType::Place;
    }
    if ORG_MARKERS.contains(&last.as_str()) {
        return EntityType::Organization;
    }
    if (2..=3).contains(&run.len()) {
        return EntityType::Person;
    }
    EntityType::Other
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_uppercase_yields_no_entities() {
        assert!(extract_entities("quarterly budget report").is_empty());
    }

    #[test]
    fn sentence_initial_single_word_is_ignored() {
        assert!(extract_entities("Show me the budget").is_empty());
    }

    #[test]
    fn two_token_run_classified_as_person() {
        let entities = extract_entities("notes from John Smith yesterday");
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].text, "John Smith");
        assert_eq!(entities[0].entity_type, EntityType::Person);
    }

    #[test]
    fn place_suffix_wins_classification() {
        let entities = extract_entities("files about Baker Street");
        assert_eq!(entities[0].entity_type, EntityType::Place);
    }

    #[test]
    fn org_marker_classified_as_organization() {
        let entities = extract_entities("contract with Acme Corp");
        assert_eq!(entities[0].entity_type, EntityType::Organization);
    }
}
