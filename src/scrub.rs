use once_cell::sync::Lazy;
use regex::Regex;

static IPV4: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:\d{1,3}\.){3}\d{1,3}\b").expect("ipv4 pattern"));

static SUBSCRIPTION_GUID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}\b")
        .expect("guid pattern")
});

static RESOURCE_PATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/subscriptions/[^\s\x22]+?/resourceGroups/[^\s\x22/]+").expect("resource path pattern")
});

static INTERNAL_HOST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[a-zA-Z0-9][a-zA-Z0-9.-]*\.(azmk8s\.io|internal\.cloudapp\.net)\b")
        .expect("hostname pattern")
});

/// Remove provider-identifying material from response text. Applied to
/// every serialized response before it leaves the process.
pub fn scrub_text(text: &str) -> String {
    let text = RESOURCE_PATH.replace_all(text, "[resource-path]");
    let text = SUBSCRIPTION_GUID.replace_all(&text, "[subscription-id]");
    let text = IPV4.replace_all(&text, "[ip]");
    let text = INTERNAL_HOST.replace_all(&text, "[internal-host]");
    text.into_owned()
}
