//! The classifier's closed species vocabulary
//!
//! 38 European wildlife classes, index-aligned with the model's output
//! layer. Order is load-bearing: changing it requires a new model version.

/// Model version recorded with every classification row
pub const MODEL_VERSION: &str = "deepfaune-1.4";

/// Output classes in model order
pub const SPECIES: [&str; 38] = [
    "bison",
    "badger",
    "ibex",
    "beaver",
    "roe_deer",
    "fallow_deer",
    "red_deer",
    "sika_deer",
    "marmot",
    "chamois",
    "cat",
    "dog",
    "squirrel",
    "blackbird",
    "pheasant",
    "fox",
    "hare",
    "human",
    "mouflon",
    "marten",
    "nutria",
    "bird",
    "raptor",
    "field_mouse",
    "rat",
    "wild_boar",
    "raccoon",
    "raccoon_dog",
    "skunk",
    "hedgehog",
    "undefined",
    "weasel",
    "empty",
    "small_rodent",
    "muskrat",
    "livestock",
    "wolf",
    "otter",
];

/// `wild_boar` -> `Wild Boar`, for labels and message text
pub fn display_name(species: &str) -> String {
    species
        .split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vocabulary_size_matches_model_head() {
        assert_eq!(SPECIES.len(), 38);
    }

    #[test]
    fn test_no_duplicate_classes() {
        let mut sorted = SPECIES.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), SPECIES.len());
    }

    #[test]
    fn test_display_name() {
        assert_eq!(display_name("wild_boar"), "Wild Boar");
        assert_eq!(display_name("fox"), "Fox");
        assert_eq!(display_name("raccoon_dog"), "Raccoon Dog");
    }
}
