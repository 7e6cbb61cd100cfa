//! Prompt assembly and response cleanup around the model call.

use geoask_dsl::grammar;

use crate::context::Context;

const FORMAT_INSTRUCTIONS: &str = "Do not respond with anything other than the Python code. Do not include comments or empty lines.";

const WORKED_EXAMPLE: &str = r#"def func1() -> Action:
    """
    Given these layers:
    * buildings_fasdff3234 (also known as Buildings, has attributes year_of_construction (also known as Year of construction, is a number), type (also known as Type, possible values are residential, industrial, commercial))
    * roads_fa4123 (also known as Roads, has attributes type (also known as Type, possible values are small, large, highway), width (also known as Width, is a number))

    Perform this action:
    Select buildings close to highways
    """

    return select(intersection(get_layer('buildings_fasdff3234'), buffer(filter(get_layer('roads_fa4123'), 'type', 'highway'), 500)))"#;

/// Few-shot completion prompt: the output format rule as a comment, the
/// constructor signatures, one worked example, then an open `func2` for
/// `question` over the layers in `context`.
pub fn render_prompt(context: &Context, question: &str) -> String {
    let functions = grammar::render_signatures_with_layers(&context.layer_names());
    let layers = context.prompt();
    format!(
        r#"# {FORMAT_INSTRUCTIONS}

{functions}

{WORKED_EXAMPLE}

def func2() -> Action:
    """
    Given these layers:
    {layers}

    Perform this action:
    {question}
    """

    return"#
    )
}

/// Description used when the pipeline is registered as a tool for an agent.
pub fn tool_description() -> String {
    let commands = grammar::action_constructors()
        .map(|c| title_case(c.name))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "Useful to act on the GIS data. Input should start with a command ({commands}), \
         followed by a free form description of what to do. Prefer this tool when asked \
         questions about locations, geography, etc."
    )
}

/// `add_to_map` → `Add_To_Map`.
fn title_case(name: &str) -> String {
    name.split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("_")
}

/// Strip a surrounding markdown code fence and leading whitespace.
///
/// Models often wrap code in "```python ... ```" despite the format
/// instructions. Text without a fence only loses its leading whitespace.
pub fn clean_response(text: &str) -> String {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return text.trim_start().to_string();
    };
    // Drop the info string (`python`, `py`, ...) on the opening fence line.
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    let body = body.strip_suffix("```").unwrap_or(body);
    body.trim_start().to_string()
}
