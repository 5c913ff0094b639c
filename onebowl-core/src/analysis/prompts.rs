//! Prompt text for bowl analysis.

use crate::types::RawRecipe;

/// System prompt for every analysis backend.
pub const BOWL_SYSTEM_PROMPT: &str = r#"You are a mise en place assistant. Your job is to reorganize recipe ingredients into "bowls": groups of ingredients that are prepped and used together at the same point in the cooking method.

Rules:
- Every ingredient must appear in exactly one bowl. Do not skip or duplicate any.
- Each bowl gets a short descriptive label (e.g. "Dry Ingredients", "Sauce") and a one-sentence explanation of when/how the bowl is used in the method.
- Method steps must be preserved exactly as written. Do not rewrite them.
- If an ingredient is used across multiple steps, place it in the bowl for the step where it is first added.
- Prefer fewer bowls when ingredients are used at the same time.

Respond with JSON only, no other text, in exactly this shape:
{"title": "Recipe title", "bowls": [{"label": "Dry Ingredients", "explanation": "Whisked together before the wet ingredients go in.", "ingredients": [{"name": "flour", "quantity": "2 cups", "note": "sifted"}]}], "method_steps": ["First step.", "Second step."]}

Use an empty string for any quantity or note that the recipe does not give."#;

/// Message for a recipe that came from structured markup.
pub fn render_structured_message(recipe: &RawRecipe) -> String {
    let ingredients = recipe
        .ingredients
        .iter()
        .map(|ingredient| format!("- {}", ingredient))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Recipe: {title}\n\nIngredients:\n{ingredients}\n\nMethod:\n{instructions}",
        title = recipe.title,
        ingredients = ingredients,
        instructions = recipe.instructions
    )
}

/// Message for a recipe that is only the page's raw text.
pub fn render_fallback_message(recipe: &RawRecipe) -> String {
    format!(
        "Below is raw text from a recipe page. Extract the title, ingredients, and method steps, then organize the ingredients into bowls.\n\n{}",
        recipe.instructions
    )
}

/// Pick the framing that matches how the recipe was extracted.
pub fn render_analysis_message(recipe: &RawRecipe) -> String {
    if recipe.is_structured() {
        render_structured_message(recipe)
    } else {
        render_fallback_message(recipe)
    }
}
