//! Strict parsing of generator output.
//!
//! Generators tend to wrap JSON in prose or Markdown fences, so the payload
//! is first located by scanning for balanced JSON, then validated against
//! the expected schema. Anything that does not validate is a parse error.

use domain::models::ParsedRecipe;
use serde::Deserialize;
use serde_json::Value;
use shared::types::{Error, Result};

/// Parses a JSON array of recipe names.
pub fn parse_recipe_names(raw: &str) -> Result<Vec<String>> {
    let value = locate_json(raw)?;
    let Value::Array(items) = value else {
        return Err(Error::parse("expected a JSON array of recipe names"));
    };
    let mut names = Vec::with_capacity(items.len());
    for (position, item) in items.into_iter().enumerate() {
        match item {
            Value::String(name) => {
                let name = name.trim();
                if name.is_empty() {
                    return Err(Error::parse(format!("recipe name {position} is blank")));
                }
                names.push(name.to_string());
            }
            other => {
                return Err(Error::parse(format!(
                    "recipe name {position} is not a string: {other}"
                )));
            }
        }
    }
    if names.is_empty() {
        return Err(Error::parse("reply contained no recipe names"));
    }
    Ok(names)
}

#[derive(Deserialize)]
struct RawRecipe {
    recipe_name: String,
    #[serde(default)]
    ingredients: Option<Vec<String>>,
    #[serde(default)]
    base_ingredients: Option<Vec<String>>,
    #[serde(default)]
    additions: Option<Vec<String>>,
}

/// Parses `[{"recipe_name", "ingredients"}]`, optionally wrapped in
/// `{"suggestions": [...]}`. Replies that split ingredients into
/// `base_ingredients`/`additions` are accepted and merged, since the split
/// is recomputed against the inventory anyway.
pub fn parse_recipes(raw: &str) -> Result<Vec<ParsedRecipe>> {
    let value = locate_json(raw)?;
    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut object) => match object.remove("suggestions") {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(Error::parse(
                    "expected a JSON array of recipes or an object with a suggestions array",
                ))
            }
        },
        _ => return Err(Error::parse("expected a JSON array of recipes")),
    };

    let mut recipes = Vec::with_capacity(items.len());
    for (position, item) in items.into_iter().enumerate() {
        let raw_recipe: RawRecipe = serde_json::from_value(item)
            .map_err(|e| Error::parse(format!("recipe {position} is malformed: {e}")))?;
        let recipe_name = raw_recipe.recipe_name.trim().to_string();
        if recipe_name.is_empty() {
            return Err(Error::parse(format!("recipe {position} has a blank name")));
        }
        let ingredients = match (
            raw_recipe.ingredients,
            raw_recipe.base_ingredients,
            raw_recipe.additions,
        ) {
            (Some(ingredients), _, _) => ingredients,
            (None, None, None) => {
                return Err(Error::parse(format!(
                    "recipe {position} ({recipe_name}) has no ingredient list"
                )))
            }
            (None, base, additions) => base
                .unwrap_or_default()
                .into_iter()
                .chain(additions.unwrap_or_default())
                .collect(),
        };
        recipes.push(ParsedRecipe {
            recipe_name,
            ingredients: ingredients
                .into_iter()
                .map(|ingredient| ingredient.trim().to_string())
                .filter(|ingredient| !ingredient.is_empty())
                .collect(),
        });
    }
    if recipes.is_empty() {
        return Err(Error::parse("reply contained no recipes"));
    }
    Ok(recipes)
}

/// Finds the first balanced JSON array or object in `raw` that parses.
fn locate_json(raw: &str) -> Result<Value> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(Error::parse("reply was empty"));
    }
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        if value.is_array() || value.is_object() {
            return Ok(value);
        }
    }

    let bytes = trimmed.as_bytes();
    for (start, &byte) in bytes.iter().enumerate() {
        if byte != b'[' && byte != b'{' {
            continue;
        }
        if let Some(end) = balanced_end(bytes, start) {
            if let Ok(value) = serde_json::from_str::<Value>(&trimmed[start..=end]) {
                return Ok(value);
            }
        }
    }
    Err(Error::parse("no JSON payload found in reply"))
}

/// Index of the bracket closing the one at `start`, skipping string bodies.
fn balanced_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, &byte) in bytes[start..].iter().enumerate() {
        if in_string {
            match byte {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'[' | b'{' => depth += 1,
            b']' | b'}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(start + offset);
                }
            }
            _ => {}
        }
    }
    None
}
