//! Splits a generated recipe's ingredients into what the user already has
//! and what they would need to buy.
//!
//! Matching policy (best effort, not exact): both sides are lowercased,
//! stripped of punctuation, whitespace-collapsed and singularized word by
//! word. An ingredient counts as available when it equals a retrieved item's
//! name, or either one contains the other as a whole-word phrase
//! ("chicken" ~ "chicken breast", "milk" ~ "coconut milk", but not
//! "milk" ~ "buttermilk").

use domain::models::{RecipeSuggestion, RetrievedContext};
use shared::text::{contains_phrase, normalize_phrase};

pub struct IngredientClassifier {
    available: Vec<String>,
}

impl IngredientClassifier {
    pub fn from_context(context: &RetrievedContext) -> Self {
        Self::from_names(context.records().map(|record| record.name.as_str()))
    }

    pub fn from_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let available = names
            .into_iter()
            .map(normalize_phrase)
            .filter(|name| !name.is_empty())
            .collect();
        Self { available }
    }

    pub fn is_available(&self, ingredient: &str) -> bool {
        let wanted = normalize_phrase(ingredient);
        if wanted.is_empty() {
            return false;
        }
        self.available.iter().any(|have| {
            *have == wanted || contains_phrase(have, &wanted) || contains_phrase(&wanted, have)
        })
    }

    /// Order within each output list follows the generated order.
    pub fn classify(&self, recipe_name: &str, ingredients: &[String]) -> RecipeSuggestion {
        let (base_ingredients, additions): (Vec<String>, Vec<String>) = ingredients
            .iter()
            .cloned()
            .partition(|ingredient| self.is_available(ingredient));
        RecipeSuggestion {
            recipe_name: recipe_name.to_string(),
            additions,
            base_ingredients,
        }
    }
}

/// One-shot form of [`IngredientClassifier::classify`].
pub fn classify(recipe_name: &str, ingredients: &[String], context: &RetrievedContext) -> RecipeSuggestion {
    IngredientClassifier::from_context(context).classify(recipe_name, ingredients)
}
