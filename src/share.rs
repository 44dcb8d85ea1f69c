//! Social sharing links and the labels built around project counts.

use crate::run::Route;
use crate::strategy::Project;
use url::Url;

pub const TWEET_INTENT_URL: &str = "https://twitter.com/intent/tweet";

/// Attribution link for the project data source
pub const GITCOIN_URL: &str = "https://gitcoin.co";

const TWEET_INTRO: &str = "Join me in supporting these awesome PGPs I found on fundpublicgoods.ai!";

/// Pick the singular or plural form for `count`
pub fn pluralize<'a>(forms: [&'a str; 2], count: usize) -> &'a str {
    if count == 1 {
        forms[0]
    } else {
        forms[1]
    }
}

/// `@handle` lines for every project with a social handle
pub fn tweet_handles<'a>(projects: impl IntoIterator<Item = &'a Project>) -> String {
    projects
        .into_iter()
        .filter_map(|p| p.twitter.as_deref())
        .map(|h| h.trim().trim_start_matches('@'))
        .filter(|h| !h.is_empty())
        .map(|h| format!("@{}", h))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Share text: intro, one `@handle` per line, and a link to the run.
///
/// The link uses the strategy route `{app_url}/s/{run_id}`, the same route a
/// regenerated run opens on, not the bare `{app_url}/{run_id}` form.
pub fn tweet_text<'a>(
    projects: impl IntoIterator<Item = &'a Project>,
    app_url: &str,
    run_id: &str,
) -> String {
    format!(
        "{}\n\n{}\n\nLink: {}",
        TWEET_INTRO,
        tweet_handles(projects),
        Route::strategy(run_id).url(app_url)
    )
}

/// Tweet-intent URL with the share text percent-encoded
pub fn tweet_url<'a>(
    projects: impl IntoIterator<Item = &'a Project>,
    app_url: &str,
    run_id: &str,
) -> String {
    let text = tweet_text(projects, app_url, run_id);
    match Url::parse_with_params(TWEET_INTENT_URL, &[("text", text.as_str())]) {
        Ok(url) => url.to_string(),
        // The base URL is a valid constant.
        Err(_) => TWEET_INTENT_URL.to_string(),
    }
}

pub fn fund_button_label(selected: usize) -> String {
    format!("Fund {} {}", selected, pluralize(["Project", "Projects"], selected))
}

pub fn success_title(selected: usize) -> String {
    format!(
        "You just funded {} {}!",
        selected,
        pluralize(["Project", "Projects"], selected)
    )
}

pub fn connect_hint(selected: usize) -> String {
    format!(
        "Connect your wallet to fund {}",
        pluralize(["this project", "these projects"], selected)
    )
}

/// Header line shown above the connect button, e.g. "3 climate projects"
pub fn selection_summary(selected: usize, prompt: &str) -> String {
    format!(
        "{} {} {}",
        selected,
        prompt.trim(),
        pluralize(["project", "projects"], selected)
    )
}
