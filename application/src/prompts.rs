//! Prompt assembly for the three query variants.

use domain::models::{OutputKind, RetrievedContext};
use domain::prompt::Prompt;

const GENERAL_SYSTEM: &str = "You are an inventory assistant. You answer questions about the \
user's household inventory: item names, quantities, prices and the month each item was bought.
Guidelines:
1. Be brief, clear and helpful.
2. Base every statement on the inventory context you are given.
3. If the context does not contain the answer, say so instead of guessing.
4. Never invent items, quantities or prices.
5. Show prices as currency amounts and quantities with units when known.";

const RECIPE_LIST_SYSTEM: &str = "You are an expert in Sri Lankan home cooking who suggests \
lunch dishes the user can make from what they already have.
Guidelines:
1. Only suggest Sri Lankan lunch dishes that use the available ingredients.
2. Prefer dishes that need at most one or two ingredients the user does not have.
3. Suggest between 3 and 5 dishes.
4. Reply with a JSON array of dish names and nothing else, for example:
[\"Rice and Curry\", \"Kottu Roti\", \"Dhal Curry\"]";

const STRUCTURED_SYSTEM: &str = "You are an expert in Sri Lankan home cooking who suggests \
lunch dishes the user can make from what they already have.
Guidelines:
1. Only suggest Sri Lankan lunch dishes that use the available ingredients.
2. Prefer dishes that need at most one or two ingredients the user does not have, and list \
those missing ingredients too.
3. Suggest between 3 and 5 dishes.
4. Reply with a JSON array of objects and nothing else. Each object has exactly two keys:
   \"recipe_name\": the dish name,
   \"ingredients\": every ingredient the dish needs, as short plain names.
Example:
[{\"recipe_name\": \"Chicken Curry\", \"ingredients\": [\"chicken\", \"onions\", \"curry powder\", \"coconut milk\"]}]";

const RECIPE_LIST_REMINDER: &str = "Your previous reply could not be read. Respond with ONLY a \
JSON array of recipe name strings, such as [\"Dish A\", \"Dish B\"]. No prose, no markdown, no \
code fences.";

const STRUCTURED_REMINDER: &str = "Your previous reply could not be read. Respond with ONLY a \
JSON array of objects shaped like {\"recipe_name\": \"...\", \"ingredients\": [\"...\"]}. No \
prose, no markdown, no code fences.";

/// Builds the grounded prompt for a query variant.
pub fn build_prompt(kind: OutputKind, context: &RetrievedContext, query: &str) -> Prompt {
    let context_text = context.render();
    match kind {
        OutputKind::Text => Prompt::new(
            GENERAL_SYSTEM,
            format!("User inventory context:\n{context_text}\n\nUser query: {query}"),
        ),
        OutputKind::RecipeList => Prompt::new(
            RECIPE_LIST_SYSTEM,
            format!(
                "Ingredients available in the user's inventory:\n{context_text}\n\n\
                 Suggest Sri Lankan lunch recipes that can be made with these ingredients, \
                 noting that dishes may need a few missing items.\n\
                 The user is looking for: {query}\n\n\
                 Return only a JSON array of recipe names."
            ),
        ),
        OutputKind::Structured => Prompt::new(
            STRUCTURED_SYSTEM,
            format!(
                "Ingredients available in the user's inventory:\n{context_text}\n\n\
                 Suggest Sri Lankan lunch recipes that can be made with these ingredients. \
                 List every ingredient each dish needs, including ones missing from the \
                 inventory.\n\
                 The user is looking for: {query}\n\n\
                 Return only a JSON array of objects with recipe_name and ingredients."
            ),
        ),
    }
}

/// Stricter follow-up instruction used when a reply failed to parse.
/// Free-text answers are never re-asked.
pub fn strict_reminder(kind: OutputKind) -> Option<&'static str> {
    match kind {
        OutputKind::Text => None,
        OutputKind::RecipeList => Some(RECIPE_LIST_REMINDER),
        OutputKind::Structured => Some(STRUCTURED_REMINDER),
    }
}
