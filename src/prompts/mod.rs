// NOTE:
// Output of the site prompt is not guaranteed to be bare JSON; callers must
// run it through `extract::extract_json`.

const SITE_INSTRUCTIONS: &str = "You are a web designer. Build a small, self-contained, \
responsive single-page website about the topic below.\n\
Respond with ONE JSON object and nothing else, using exactly these string fields:\n\
  \"html\": the markup for the <body> contents (no <html>, <head> or <body> tags),\n\
  \"css\": the full stylesheet,\n\
  \"js\": any script the page needs, or an empty string.\n\
Do not reference external assets.";

const CHAT_INSTRUCTIONS: &str = "You are a friendly assistant helping a user plan and refine \
a website. Answer concisely in plain text.";

pub fn site_prompt(topic: &str) -> String {
    format!("{SITE_INSTRUCTIONS}\n\nTOPIC:\n{}\n", topic.trim())
}

pub fn chat_prompt(message: &str) -> String {
    format!("{CHAT_INSTRUCTIONS}\n\nUSER:\n{}\n", message.trim())
}
