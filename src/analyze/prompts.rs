//! Prompt templates. Every prompt opens with a `TASK:` line.

pub const SYSTEM: &str = "You are an analyst for the residential housing industry. \
Answer precisely and only in the requested format.";

/// Characters of source text handed to extraction.
pub const EXTRACT_PREFIX_CHARS: usize = 5000;

pub fn extraction(content_prefix: &str) -> String {
    format!(
        "TASK: extract\n\
Extract the important information from the HTML or text below.\n\n\
Content:\n{content_prefix}\n\n\
Reply with JSON only, in this shape:\n\
{{\"text\": \"key text, at most 500 characters\", \
\"tables\": [\"table as Markdown\"], \
\"images\": [{{\"url\": \"image URL\", \"alt\": \"description\"}}]}}"
    )
}

pub fn classify(text: &str) -> String {
    format!(
        "TASK: classify\n\
Classify the following article.\n\n\
Article:\n{text}\n\n\
Reply with JSON only:\n\
{{\"type\": \"product|spec|price|regulation|case_study|recruitment\", \
\"company\": \"company name\", \"product\": \"product name or null\", \
\"price_band\": \"price band or null\", \"specs\": [\"spec\"], \
\"topic_tags\": [\"tag\"]}}"
    )
}

pub fn compare(classification_json: &str, text: &str) -> String {
    format!(
        "TASK: compare\n\
Compare this product or specification against the market, in Markdown.\n\
Cover strengths, weaknesses and how it differs from competitors.\n\n\
Classification:\n{classification_json}\n\n\
Article:\n{text}"
    )
}

pub fn trend(classifications_json: &str, counters_json: &str) -> String {
    format!(
        "TASK: trend\n\
Identify trends from today's classified articles and recent keyword counts.\n\n\
Classifications:\n{classifications_json}\n\n\
Keyword counts:\n{counters_json}\n\n\
Reply with JSON only:\n\
{{\"trends\": [{{\"keyword\": \"k\", \"frequency\": 0, \"change_rate\": 0.0, \
\"hypothesis\": \"why\", \"next_observation\": \"what to watch\"}}], \
\"summary\": \"one paragraph\"}}"
    )
}

pub fn strategy(trend_json: &str, classifications_json: &str) -> String {
    format!(
        "TASK: strategy\n\
Propose concrete actions per department based on the trends and articles.\n\n\
Trends:\n{trend_json}\n\n\
Articles:\n{classifications_json}\n\n\
Reply with JSON only:\n\
{{\"sales\": [{{\"action\": \"a\", \"owner\": \"o\", \"deadline\": \"d\", \"reason\": \"r\"}}], \
\"design\": [], \"marketing\": [], \"product\": []}}"
    )
}

pub fn newspaper(date: &str, material_json: &str) -> String {
    format!(
        "TASK: newspaper\n\
Write today's industry newspaper for {date} in Markdown.\n\
Start with a `#` title, then three short headline lines, then sections for\n\
top stories, comparisons, trends and recommended actions.\n\n\
Material:\n{material_json}"
    )
}
