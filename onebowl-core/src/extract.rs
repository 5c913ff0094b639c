//! Recipe extraction from fetched HTML.
//!
//! Structured markup is tried first (JSON-LD, then microdata, then common
//! recipe-plugin classes). A structured result only counts when it carries at
//! least one ingredient; otherwise the page's visible text is used instead.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};

use crate::error::ExtractError;
use crate::types::{ExtractRecipeOutput, ExtractionAttempt, ExtractionMethod, RawRecipe};

/// Minimum visible text (in characters) for the text fallback to accept a page.
pub const MIN_FALLBACK_CHARS: usize = 50;

/// Title used when a page has no usable `<title>`.
pub const UNKNOWN_TITLE: &str = "Unknown Recipe";

/// Elements whose content is never treated as page text.
const NON_CONTENT_TAGS: [&str; 6] = ["script", "style", "nav", "header", "footer", "aside"];

/// Regex to find JSON-LD script tags (case-insensitive for type attribute)
static JSONLD_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<script[^>]*type\s*=\s*["']application/ld\+json["'][^>]*>(.*?)</script>"#)
        .expect("Invalid JSON-LD regex")
});

static HTML_TAG_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]+>").expect("Invalid HTML tag regex"));

static LINE_BREAK_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<br\s*/?>|</p>\s*<p[^>]*>|</?p[^>]*>").expect("Invalid line break regex")
});

/// Jetpack recipes on malformed pages close the directions div immediately,
/// leaving the steps as siblings. Capture between that close and the container close.
static JETPACK_DIRECTIONS_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?is)<div[^>]*class="[^"]*jetpack-recipe-directions[^"]*"[^>]*>.*?</div>\s*(?:<br\s*/?>)?\s*(.*?)</div>\s*</div>"#,
    )
    .expect("Invalid Jetpack directions regex")
});

static JSONLD_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("script[type='application/ld+json']").expect("Invalid selector")
});

static MICRODATA_RECIPE_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(
        r#"[itemtype="http://schema.org/Recipe"], [itemtype="https://schema.org/Recipe"]"#,
    )
    .expect("Invalid selector")
});

static MICRODATA_INGREDIENT_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"[itemprop="recipeIngredient"], [itemprop="ingredients"]"#)
        .expect("Invalid selector")
});

static MICRODATA_STEP_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(
        r#"[itemprop="recipeInstructions"], [itemprop="instructions"], [itemtype*="HowToStep"]"#,
    )
    .expect("Invalid selector")
});

static MICRODATA_TEXT_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"[itemprop="text"]"#).expect("Invalid selector"));

static TITLE_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("title").expect("Invalid selector"));

/// Extract a recipe, trying every structured method before the text fallback.
///
/// Only fails when the fallback fails too; structured failures are recorded in
/// `all_attempts` and never returned.
pub fn extract(html: &str, source_url: &str) -> Result<ExtractRecipeOutput, ExtractError> {
    let mut attempts = Vec::new();

    if let Some((raw_recipe, method_used)) = extract_structured(html, source_url, &mut attempts) {
        tracing::debug!(
            url = source_url,
            method = method_used.as_str(),
            ingredients = raw_recipe.ingredients.len(),
            "extract: structured recipe found"
        );
        return Ok(ExtractRecipeOutput {
            raw_recipe,
            method_used,
            all_attempts: attempts,
        });
    }

    let result = extract_fallback(html, source_url);
    attempts.push(attempt(ExtractionMethod::TextFallback, &result));
    let raw_recipe = result?;

    tracing::debug!(
        url = source_url,
        method = ExtractionMethod::TextFallback.as_str(),
        chars = raw_recipe.instructions.chars().count(),
        "extract: using page text"
    );
    Ok(ExtractRecipeOutput {
        raw_recipe,
        method_used: ExtractionMethod::TextFallback,
        all_attempts: attempts,
    })
}

fn attempt<T>(method: ExtractionMethod, result: &Result<T, ExtractError>) -> ExtractionAttempt {
    ExtractionAttempt {
        method,
        success: result.is_ok(),
        error: result.as_ref().err().map(|e| e.to_string()),
    }
}

/// Run the structured methods in order, recording each attempt.
fn extract_structured(
    html: &str,
    source_url: &str,
    attempts: &mut Vec<ExtractionAttempt>,
) -> Option<(RawRecipe, ExtractionMethod)> {
    // Fast path: regex scan avoids building a DOM for the common case
    if let Some(recipe) = extract_jsonld_fast(html, source_url) {
        attempts.push(ExtractionAttempt {
            method: ExtractionMethod::JsonLd,
            success: true,
            error: None,
        });
        return Some((recipe, ExtractionMethod::JsonLd));
    }

    let document = Html::parse_document(html);

    let method = ExtractionMethod::JsonLd;
    if let Some(recipe) = record(
        method,
        extract_recipe_from_jsonld(&document, source_url),
        attempts,
        source_url,
    ) {
        return Some((recipe, method));
    }

    let method = ExtractionMethod::Microdata;
    if let Some(recipe) = record(
        method,
        extract_recipe_from_microdata(&document, source_url),
        attempts,
        source_url,
    ) {
        return Some((recipe, method));
    }

    let method = ExtractionMethod::HtmlClasses;
    record(
        method,
        extract_recipe_with_html_classes(html, &document, source_url),
        attempts,
        source_url,
    )
    .map(|recipe| (recipe, method))
}

fn record(
    method: ExtractionMethod,
    result: Result<RawRecipe, ExtractError>,
    attempts: &mut Vec<ExtractionAttempt>,
    source_url: &str,
) -> Option<RawRecipe> {
    attempts.push(attempt(method, &result));
    match result {
        Ok(recipe) => Some(recipe),
        Err(e) => {
            tracing::debug!(
                url = source_url,
                method = method.as_str(),
                error = %e,
                "extract: structured method failed"
            );
            None
        }
    }
}

/// Fast JSON-LD extraction using regex to avoid DOM parsing.
fn extract_jsonld_fast(html: &str, source_url: &str) -> Option<RawRecipe> {
    JSONLD_REGEX
        .captures_iter(html)
        .filter_map(|cap| cap.get(1))
        .filter_map(|m| parse_jsonld(m.as_str()))
        .find_map(|json| {
            find_recipe_in_json(&json).and_then(|recipe| recipe_from_json(recipe, source_url).ok())
        })
}

/// Extract recipe from JSON-LD script tags.
fn extract_recipe_from_jsonld(
    document: &Html,
    source_url: &str,
) -> Result<RawRecipe, ExtractError> {
    for element in document.select(&JSONLD_SELECTOR) {
        let Some(json) = parse_jsonld(&element.inner_html()) else {
            continue;
        };

        if let Some(recipe) = find_recipe_in_json(&json) {
            return recipe_from_json(recipe, source_url);
        }
    }

    Err(ExtractError::NoRecipe)
}

fn parse_jsonld(text: &str) -> Option<serde_json::Value> {
    serde_json::from_str(&sanitize_json(text)).ok()
}

/// Sanitize JSON-LD content to handle common malformed patterns.
/// Some sites include literal newlines/tabs inside JSON strings instead of escaped versions.
fn sanitize_json(json: &str) -> String {
    let mut result = String::with_capacity(json.len());
    let mut in_string = false;
    let mut escaped = false;

    for c in json.chars() {
        if in_string {
            if escaped {
                escaped = false;
                result.push(c);
                continue;
            }
            match c {
                '\\' => {
                    escaped = true;
                    result.push(c);
                }
                '"' => {
                    in_string = false;
                    result.push(c);
                }
                '\n' => result.push_str("\\n"),
                '\r' => result.push_str("\\r"),
                '\t' => result.push_str("\\t"),
                c if c.is_control() => {}
                _ => result.push(c),
            }
        } else {
            if c == '"' {
                in_string = true;
            }
            result.push(c);
        }
    }

    result
}

/// Recursively search for a Recipe object in JSON-LD.
/// Handles @graph arrays and nested structures.
fn find_recipe_in_json(json: &serde_json::Value) -> Option<&serde_json::Value> {
    match json {
        serde_json::Value::Object(obj) => {
            let is_recipe = match obj.get("@type") {
                Some(serde_json::Value::String(s)) => s == "Recipe",
                Some(serde_json::Value::Array(arr)) => arr.iter().any(|v| v == "Recipe"),
                _ => false,
            };
            if is_recipe {
                return Some(json);
            }

            if let Some(recipe) = obj.get("@graph").and_then(find_recipe_in_json) {
                return Some(recipe);
            }

            obj.values().find_map(find_recipe_in_json)
        }
        serde_json::Value::Array(arr) => arr.iter().find_map(find_recipe_in_json),
        _ => None,
    }
}

fn recipe_from_json(
    recipe: &serde_json::Value,
    source_url: &str,
) -> Result<RawRecipe, ExtractError> {
    let title =
        json_title(recipe).ok_or_else(|| ExtractError::MissingField("name".to_string()))?;
    let ingredients = json_ingredients(recipe)?;
    let instructions = json_instructions(recipe).unwrap_or_default();

    Ok(RawRecipe {
        title,
        ingredients,
        instructions,
        source_url: source_url.to_string(),
    })
}

fn json_title(recipe: &serde_json::Value) -> Option<String> {
    recipe
        .get("name")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn json_ingredients(recipe: &serde_json::Value) -> Result<Vec<String>, ExtractError> {
    let ingredients = recipe
        .get("recipeIngredient")
        .or_else(|| recipe.get("ingredients"))
        .ok_or_else(|| ExtractError::MissingField("recipeIngredient".to_string()))?;

    let ingredients: Vec<String> = match ingredients {
        serde_json::Value::Array(arr) => arr
            .iter()
            .filter_map(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        serde_json::Value::String(s) => s
            .lines()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => {
            return Err(ExtractError::InvalidJson(
                "recipeIngredient is not an array".to_string(),
            ))
        }
    };

    if ingredients.is_empty() {
        return Err(ExtractError::MissingField(
            "recipeIngredient (empty)".to_string(),
        ));
    }

    Ok(ingredients)
}

/// Instructions as newline-separated steps. Handles plain strings, HowToStep
/// objects and HowToSection groups.
fn json_instructions(recipe: &serde_json::Value) -> Option<String> {
    let steps: Vec<String> = match recipe.get("recipeInstructions")? {
        serde_json::Value::String(s) => vec![s.trim().to_string()],
        serde_json::Value::Array(arr) => arr.iter().flat_map(json_steps).collect(),
        item @ serde_json::Value::Object(_) => json_steps(item),
        _ => return None,
    };

    let steps: Vec<String> = steps.into_iter().filter(|s| !s.is_empty()).collect();
    if steps.is_empty() {
        None
    } else {
        Some(steps.join("\n"))
    }
}

fn json_steps(item: &serde_json::Value) -> Vec<String> {
    if let Some(s) = item.as_str() {
        return vec![s.trim().to_string()];
    }
    if let Some(text) = item.get("text").and_then(|v| v.as_str()) {
        return vec![text.trim().to_string()];
    }
    if let Some(items) = item.get("itemListElement").and_then(|v| v.as_array()) {
        return items.iter().flat_map(json_steps).collect();
    }
    Vec::new()
}

/// Extract recipe from schema.org microdata markup.
fn extract_recipe_from_microdata(
    document: &Html,
    source_url: &str,
) -> Result<RawRecipe, ExtractError> {
    let recipe_element = document
        .select(&MICRODATA_RECIPE_SELECTOR)
        .next()
        .ok_or(ExtractError::NoRecipe)?;

    let title = microdata_text(&recipe_element, "name")
        .ok_or_else(|| ExtractError::MissingField("name".to_string()))?;

    let ingredients = element_texts(recipe_element.select(&MICRODATA_INGREDIENT_SELECTOR));
    if ingredients.is_empty() {
        return Err(ExtractError::MissingField(
            "recipeIngredient (empty)".to_string(),
        ));
    }

    Ok(RawRecipe {
        title,
        ingredients,
        instructions: microdata_instructions(&recipe_element).unwrap_or_default(),
        source_url: source_url.to_string(),
    })
}

/// Text content of the first element with the given itemprop.
fn microdata_text(element: &ElementRef, prop: &str) -> Option<String> {
    let selector = Selector::parse(&format!(r#"[itemprop="{}"]"#, prop)).ok()?;
    let el = element.select(&selector).next()?;
    let text = match el.value().attr("content") {
        Some(content) => content.trim().to_string(),
        None => element_text(el),
    };
    Some(text).filter(|t| !t.is_empty())
}

fn microdata_instructions(recipe_element: &ElementRef) -> Option<String> {
    let steps: Vec<String> = recipe_element
        .select(&MICRODATA_STEP_SELECTOR)
        .map(|el| match el.select(&MICRODATA_TEXT_SELECTOR).next() {
            Some(text_el) => element_text(text_el),
            None => element_text(el),
        })
        .filter(|s| !s.is_empty())
        .collect();

    if steps.is_empty() {
        None
    } else {
        Some(steps.join("\n"))
    }
}

/// Whatever structured data a page has, without failing on missing fields.
#[derive(Default)]
struct PartialRecipe {
    title: Option<String>,
    ingredients: Option<Vec<String>>,
    instructions: Option<String>,
}

impl PartialRecipe {
    fn or(self, other: PartialRecipe) -> PartialRecipe {
        PartialRecipe {
            title: self.title.or(other.title),
            ingredients: self.ingredients.or(other.ingredients),
            instructions: self.instructions.or(other.instructions),
        }
    }
}

fn partial_from_jsonld(html: &str) -> PartialRecipe {
    JSONLD_REGEX
        .captures_iter(html)
        .filter_map(|cap| cap.get(1))
        .filter_map(|m| parse_jsonld(m.as_str()))
        .find_map(|json| {
            find_recipe_in_json(&json).map(|recipe| PartialRecipe {
                title: json_title(recipe),
                ingredients: json_ingredients(recipe).ok(),
                instructions: json_instructions(recipe),
            })
        })
        .unwrap_or_default()
}

fn partial_from_microdata(document: &Html) -> PartialRecipe {
    let Some(recipe_element) = document.select(&MICRODATA_RECIPE_SELECTOR).next() else {
        return PartialRecipe::default();
    };

    let ingredients = element_texts(recipe_element.select(&MICRODATA_INGREDIENT_SELECTOR));
    PartialRecipe {
        title: microdata_text(&recipe_element, "name"),
        ingredients: Some(ingredients).filter(|i| !i.is_empty()),
        instructions: microdata_instructions(&recipe_element),
    }
}

/// Combine partial structured data with common recipe-plugin classes.
fn extract_recipe_with_html_classes(
    html: &str,
    document: &Html,
    source_url: &str,
) -> Result<RawRecipe, ExtractError> {
    let partial = partial_from_jsonld(html).or(partial_from_microdata(document));

    let ingredients = partial
        .ingredients
        .or_else(|| ingredients_from_html_classes(document))
        .or_else(|| {
            selector_texts(
                document,
                r#"[itemprop="recipeIngredient"], [itemprop="ingredients"]"#,
            )
        })
        .ok_or_else(|| ExtractError::MissingField("recipeIngredient (empty)".to_string()))?;

    let title = partial
        .title
        .or_else(|| title_from_html(document))
        .ok_or_else(|| ExtractError::MissingField("name".to_string()))?;

    let instructions = partial
        .instructions
        .or_else(|| instructions_from_html_classes(document))
        .or_else(|| instructions_from_raw_html(html))
        .unwrap_or_default();

    Ok(RawRecipe {
        title,
        ingredients,
        instructions,
        source_url: source_url.to_string(),
    })
}

fn ingredients_from_html_classes(document: &Html) -> Option<Vec<String>> {
    [
        ".wprm-recipe-ingredient",
        ".tasty-recipe-ingredients li",
        ".jetpack-recipe-ingredient",
    ]
    .into_iter()
    .find_map(|selector| selector_texts(document, selector))
    .or_else(|| ingredients_from_div(document))
}

/// `<div class="ingredients">` with `<br>`-separated lines (older WordPress themes).
fn ingredients_from_div(document: &Html) -> Option<Vec<String>> {
    let selector = Selector::parse("div.ingredients").ok()?;
    let div = document.select(&selector).next()?;

    let inner_html = div.inner_html();
    let lines: Vec<String> = LINE_BREAK_REGEX
        .split(&inner_html)
        .map(strip_tags)
        .filter(|line| !line.is_empty())
        .collect();

    Some(lines).filter(|l| !l.is_empty())
}

fn instructions_from_html_classes(document: &Html) -> Option<String> {
    [
        ".wprm-recipe-instruction",
        ".tasty-recipe-instructions li",
        ".jetpack-recipe-directions",
        ".recipe-instructions",
        ".e-instructions",
        "div.instructions",
        ".recipe-directions",
    ]
    .into_iter()
    .find_map(|selector| selector_texts(document, selector))
    .map(|steps| steps.join("\n"))
}

fn instructions_from_raw_html(html: &str) -> Option<String> {
    let content = JETPACK_DIRECTIONS_REGEX.captures(html)?.get(1)?;
    let paragraphs: Vec<String> = LINE_BREAK_REGEX
        .split(content.as_str())
        .map(strip_tags)
        .filter(|p| !p.is_empty())
        .collect();

    if paragraphs.is_empty() {
        None
    } else {
        Some(paragraphs.join("\n"))
    }
}

/// Recipe title from common HTML elements, then the page title minus any site suffix.
fn title_from_html(document: &Html) -> Option<String> {
    let from_elements = [
        ".wprm-recipe-name",
        ".tasty-recipes-title",
        ".jetpack-recipe-title",
        "h1.entry-title",
        "h2.entry-title",
    ]
    .into_iter()
    .filter_map(|s| Selector::parse(s).ok())
    .find_map(|selector| {
        document
            .select(&selector)
            .next()
            .map(element_text)
            .filter(|t| !t.is_empty())
    });

    from_elements.or_else(|| {
        let title = page_title(document)?;
        let stripped = title
            .split(" | ")
            .next()
            .and_then(|t| t.split(" - ").next())
            .unwrap_or(title.as_str())
            .trim()
            .to_string();
        Some(stripped).filter(|t| !t.is_empty())
    })
}

fn page_title(document: &Html) -> Option<String> {
    document
        .select(&TITLE_SELECTOR)
        .next()
        .map(element_text)
        .filter(|t| !t.is_empty())
}

fn selector_texts(document: &Html, selector: &str) -> Option<Vec<String>> {
    let selector = Selector::parse(selector).ok()?;
    Some(element_texts(document.select(&selector))).filter(|items| !items.is_empty())
}

fn element_texts<'a>(elements: impl Iterator<Item = ElementRef<'a>>) -> Vec<String> {
    elements
        .map(element_text)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Element text with runs of whitespace collapsed.
fn element_text(el: ElementRef) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn strip_tags(fragment: &str) -> String {
    decode_entities(HTML_TAG_REGEX.replace_all(fragment, "").trim())
}

fn decode_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#8217;", "\u{2019}")
        .replace("&#8220;", "\u{201c}")
        .replace("&#8221;", "\u{201d}")
        .replace("&deg;", "\u{00b0}")
        .replace("&nbsp;", " ")
        .replace("&#038;", "&")
        .replace("&amp;", "&")
}

/// Build a recipe from the page's visible text.
///
/// Ingredients are left empty and `instructions` holds the text, one block per line.
/// The parser always supplies a `<body>`, so a page whose chosen container has
/// no visible text at all is `NoContent`.
pub fn extract_fallback(html: &str, source_url: &str) -> Result<RawRecipe, ExtractError> {
    let document = Html::parse_document(html);

    let container = ["main", "article", "body"]
        .into_iter()
        .find_map(|tag| first_content_element(&document, tag))
        .ok_or(ExtractError::NoContent)?;

    let mut blocks = Vec::new();
    collect_text_blocks(container, &mut blocks);
    if blocks.is_empty() {
        return Err(ExtractError::NoContent);
    }
    let text = blocks.join("\n");

    let length = text.chars().count();
    if length < MIN_FALLBACK_CHARS {
        return Err(ExtractError::InsufficientContent { length });
    }

    let title = page_title(&document).unwrap_or_else(|| UNKNOWN_TITLE.to_string());

    Ok(RawRecipe {
        title,
        ingredients: Vec::new(),
        instructions: text,
        source_url: source_url.to_string(),
    })
}

fn is_non_content(el: &ElementRef) -> bool {
    NON_CONTENT_TAGS.contains(&el.value().name())
}

/// First `tag` element that is not nested inside non-content markup.
fn first_content_element<'a>(document: &'a Html, tag: &str) -> Option<ElementRef<'a>> {
    let selector = Selector::parse(tag).ok()?;
    document.select(&selector).find(|el| {
        !el.ancestors()
            .filter_map(ElementRef::wrap)
            .any(|ancestor| is_non_content(&ancestor))
    })
}

fn collect_text_blocks(element: ElementRef, blocks: &mut Vec<String>) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    blocks.push(trimmed.to_string());
                }
            }
            Node::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    if !is_non_content(&child_el) {
                        collect_text_blocks(child_el, blocks);
                    }
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://recipes.example/bread";

    fn jsonld_page(recipe_json: &str, body: &str) -> String {
        format!(
            r#"<!DOCTYPE html>
            <html>
            <head>
                <title>Bread | Recipes Example</title>
                <script type="application/ld+json">{}</script>
            </head>
            <body>{}</body>
            </html>"#,
            recipe_json, body
        )
    }

    #[test]
    fn test_jsonld_recipe() {
        let html = jsonld_page(
            r#"{"@context": "https://schema.org", "@type": "Recipe", "name": "Simple Bread",
                "recipeIngredient": ["2 cups flour", "1 egg"],
                "recipeInstructions": "Mix and bake."}"#,
            "",
        );

        let output = extract(&html, URL).unwrap();
        assert_eq!(output.method_used, ExtractionMethod::JsonLd);
        assert_eq!(output.raw_recipe.title, "Simple Bread");
        assert_eq!(output.raw_recipe.ingredients, vec!["2 cups flour", "1 egg"]);
        assert_eq!(output.raw_recipe.instructions, "Mix and bake.");
        assert_eq!(output.raw_recipe.source_url, URL);
        assert!(output.raw_recipe.is_structured());
    }

    #[test]
    fn test_jsonld_graph_with_howto_steps() {
        let html = jsonld_page(
            r#"{"@context": "https://schema.org", "@graph": [
                {"@type": "WebPage", "name": "Page"},
                {"@type": ["Recipe", "NewsArticle"], "name": "Pie",
                 "recipeIngredient": ["1 crust", "  ", "3 apples"],
                 "recipeInstructions": [
                    {"@type": "HowToSection", "itemListElement": [
                        {"@type": "HowToStep", "text": "Slice apples."},
                        {"@type": "HowToStep", "text": "Fill crust."}
                    ]},
                    {"@type": "HowToStep", "text": "Bake."}
                 ]}
            ]}"#,
            "",
        );

        let recipe = extract(&html, URL).unwrap().raw_recipe;
        assert_eq!(recipe.title, "Pie");
        assert_eq!(recipe.ingredients, vec!["1 crust", "3 apples"]);
        assert_eq!(recipe.instructions, "Slice apples.\nFill crust.\nBake.");
    }

    #[test]
    fn test_jsonld_without_instructions_is_still_structured() {
        let html = jsonld_page(
            r#"{"@type": "Recipe", "name": "Salad", "recipeIngredient": ["lettuce"]}"#,
            "",
        );

        let recipe = extract(&html, URL).unwrap().raw_recipe;
        assert_eq!(recipe.ingredients, vec!["lettuce"]);
        assert_eq!(recipe.instructions, "");
    }

    #[test]
    fn test_sanitize_json_escapes_raw_newlines_in_strings() {
        let raw = "{\"name\": \"Line one\nLine two\", \"q\": \"say \\\"hi\\\"\tnow\"}";
        let value: serde_json::Value = serde_json::from_str(&sanitize_json(raw)).unwrap();
        assert_eq!(value["name"], "Line one\nLine two");
        assert_eq!(value["q"], "say \"hi\"\tnow");
    }

    #[test]
    fn test_jsonld_with_raw_newlines_parses() {
        let html = jsonld_page(
            "{\"@type\": \"Recipe\", \"name\": \"Soup\", \"recipeIngredient\": [\"water\"], \"recipeInstructions\": \"Boil.\nServe.\"}",
            "",
        );
        let recipe = extract(&html, URL).unwrap().raw_recipe;
        assert_eq!(recipe.instructions, "Boil.\nServe.");
    }

    #[test]
    fn test_microdata_recipe() {
        let html = r#"
            <html><body>
                <div itemscope itemtype="https://schema.org/Recipe">
                    <h1 itemprop="name">Test Recipe</h1>
                    <ul>
                        <li itemprop="recipeIngredient">1 cup flour</li>
                        <li itemprop="recipeIngredient">2 eggs</li>
                    </ul>
                    <div itemprop="recipeInstructions">Mix and bake.</div>
                </div>
            </body></html>
        "#;

        let output = extract(html, URL).unwrap();
        assert_eq!(output.method_used, ExtractionMethod::Microdata);
        assert_eq!(output.raw_recipe.title, "Test Recipe");
        assert_eq!(output.raw_recipe.ingredients, vec!["1 cup flour", "2 eggs"]);
        assert_eq!(output.raw_recipe.instructions, "Mix and bake.");
        assert_eq!(output.all_attempts.len(), 2);
        assert!(!output.all_attempts[0].success);
        assert!(output.all_attempts[1].success);
    }

    #[test]
    fn test_jsonld_empty_ingredients_supplemented_by_plugin_classes() {
        let html = jsonld_page(
            r#"{"@type": "Recipe", "name": "Cookies", "recipeIngredient": [],
                "recipeInstructions": "Bake at 350."}"#,
            r#"<ul>
                 <li class="wprm-recipe-ingredient">1 cup butter</li>
                 <li class="wprm-recipe-ingredient">2 cups sugar</li>
               </ul>"#,
        );

        let output = extract(&html, URL).unwrap();
        assert_eq!(output.method_used, ExtractionMethod::HtmlClasses);
        assert_eq!(output.raw_recipe.title, "Cookies");
        assert_eq!(
            output.raw_recipe.ingredients,
            vec!["1 cup butter", "2 cups sugar"]
        );
        assert_eq!(output.raw_recipe.instructions, "Bake at 350.");
    }

    #[test]
    fn test_plugin_classes_title_from_page_title() {
        let html = r#"
            <html><head><title>Lemon Bars - Some Food Blog</title></head>
            <body>
                <div class="ingredients"><p>1 cup flour<br>2 lemons<br/>1 &amp; 1/2 cups sugar</p></div>
                <div class="instructions">Bake until set.</div>
            </body></html>
        "#;

        let output = extract(html, URL).unwrap();
        assert_eq!(output.method_used, ExtractionMethod::HtmlClasses);
        assert_eq!(output.raw_recipe.title, "Lemon Bars");
        assert_eq!(
            output.raw_recipe.ingredients,
            vec!["1 cup flour", "2 lemons", "1 & 1/2 cups sugar"]
        );
        assert_eq!(output.raw_recipe.instructions, "Bake until set.");
    }

    #[test]
    fn test_structured_with_zero_ingredients_falls_back_to_text() {
        let html = jsonld_page(
            r#"{"@type": "Recipe", "name": "Mystery", "recipeIngredient": []}"#,
            r#"<main><p>Combine everything you have in a large bowl and stir well.</p></main>"#,
        );

        let output = extract(&html, URL).unwrap();
        assert_eq!(output.method_used, ExtractionMethod::TextFallback);
        assert!(output.raw_recipe.ingredients.is_empty());
        assert!(!output.raw_recipe.is_structured());
        assert_eq!(
            output.raw_recipe.instructions,
            "Combine everything you have in a large bowl and stir well."
        );
        assert_eq!(output.raw_recipe.title, "Bread | Recipes Example");

        let methods: Vec<_> = output.all_attempts.iter().map(|a| a.method).collect();
        assert_eq!(
            methods,
            vec![
                ExtractionMethod::JsonLd,
                ExtractionMethod::Microdata,
                ExtractionMethod::HtmlClasses,
                ExtractionMethod::TextFallback
            ]
        );
    }

    #[test]
    fn test_fallback_rejects_short_text() {
        let html = "<html><body><p>Too short to be a recipe.</p></body></html>";

        let err = extract(html, URL).unwrap_err();
        match err {
            ExtractError::InsufficientContent { length } => assert_eq!(length, 25),
            other => panic!("expected InsufficientContent, got {:?}", other),
        }
    }

    #[test]
    fn test_fallback_page_without_text_is_no_content() {
        assert!(matches!(extract_fallback("", URL), Err(ExtractError::NoContent)));

        let html = "<html><body><nav>Home</nav><script>var x = 1;</script></body></html>";
        assert!(matches!(extract_fallback(html, URL), Err(ExtractError::NoContent)));

        let err = extract(html, URL).unwrap_err();
        assert!(matches!(err, ExtractError::NoContent));
    }

    #[test]
    fn test_fallback_counts_characters_not_bytes() {
        // 49 two-byte characters: long in bytes, short in characters
        let text = "é".repeat(49);
        let html = format!("<html><body><p>{}</p></body></html>", text);
        assert!(matches!(
            extract_fallback(&html, URL),
            Err(ExtractError::InsufficientContent { length: 49 })
        ));

        let html = format!("<html><body><p>{}é</p></body></html>", text);
        assert!(extract_fallback(&html, URL).is_ok());
    }

    #[test]
    fn test_fallback_accepts_fifty_characters() {
        let text = "a".repeat(50);
        let html = format!("<html><body><div>{}</div></body></html>", text);

        let recipe = extract_fallback(&html, URL).unwrap();
        assert!(recipe.ingredients.is_empty());
        assert_eq!(recipe.instructions, text);
        assert_eq!(recipe.title, UNKNOWN_TITLE);
    }

    #[test]
    fn test_fallback_skips_non_content_and_prefers_main() {
        let html = r#"
            <html>
            <head><title> Grandma's Stew </title><style>body { color: red; }</style></head>
            <body>
                <header><main>Header main should be ignored entirely here.</main></header>
                <nav>Home | Recipes | About</nav>
                <article>Article text is not chosen when a main element exists.</article>
                <main>
                    <h1>Stew</h1>
                    <script>var tracking = true;</script>
                    <p>Brown the beef in batches, then add onions and carrots.</p>
                    <aside>Sponsored content</aside>
                    <p>Simmer for two hours.</p>
                </main>
                <footer>Copyright</footer>
            </body>
            </html>
        "#;

        let recipe = extract_fallback(html, URL).unwrap();
        assert_eq!(recipe.title, "Grandma's Stew");
        assert_eq!(
            recipe.instructions,
            "Stew\nBrown the beef in batches, then add onions and carrots.\nSimmer for two hours."
        );
    }

    #[test]
    fn test_fallback_uses_article_then_body() {
        let html = r#"
            <html><body>
                <div>Outside the article, which wins over body text.</div>
                <article><p>Whisk the eggs with milk and pour over the bread cubes.</p></article>
            </body></html>
        "#;
        let recipe = extract_fallback(html, URL).unwrap();
        assert_eq!(
            recipe.instructions,
            "Whisk the eggs with milk and pour over the bread cubes."
        );

        let html = r#"
            <html><body>
                <nav>Skip me</nav>
                <p>Toast the spices, grind them, and rub them over the chicken.</p>
            </body></html>
        "#;
        let recipe = extract_fallback(html, URL).unwrap();
        assert_eq!(
            recipe.instructions,
            "Toast the spices, grind them, and rub them over the chicken."
        );
    }
}
