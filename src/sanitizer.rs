//! Post-processing of model output.
//!
//! The model has no live view of the web, so every URL it emits is treated
//! as fabricated. [`ResponseSanitizer`] applies an ordered rule list that
//! removes echoed diagnostic markers, replaces hyperlinks and video links
//! with a search instruction in the caller's register, and collapses runs
//! of blank lines.
//!
//! Order matters: the video rules run before the catch-all URL rules so a
//! YouTube link gets the video instruction, not the generic one.
//!
//! The built-in rule set is idempotent. Extra rules from configuration run
//! after the link rules and are the operator's responsibility.

use anyhow::{Context, Result};
use regex::{Captures, Regex};
use tracing::debug;

use crate::config::SanitizerConfig;
use crate::models::{NoticeKind, Replacement, SanitizationRule, ScriptTag};

/// Characters a bare URL may contain, and those it may not end with.
const URL_BODY: &str = r#"[^\s<>()\[\]"']*"#;
const URL_END: &str = r#"[^\s<>()\[\]"'.,;:!?]"#;

/// The search instruction that replaces a removed link.
pub fn notice(kind: NoticeKind, register: ScriptTag) -> &'static str {
    match (kind, register) {
        (NoticeKind::Video, ScriptTag::Latin) => "(search for this video on YouTube)",
        (NoticeKind::Video, ScriptTag::Native) => "(यो भिडियो YouTube मा खोज्नुहोस्)",
        (NoticeKind::Video, ScriptTag::Romanized) => "(yo video YouTube ma khojnuhos)",
        (NoticeKind::Link, ScriptTag::Latin) => "(search online for this)",
        (NoticeKind::Link, ScriptTag::Native) => "(यसबारे अनलाइन खोज्नुहोस्)",
        (NoticeKind::Link, ScriptTag::Romanized) => "(yesbare online khojnuhos)",
    }
}

/// Upper bound on full rule passes; removing one marker can expose another.
const MAX_PASSES: usize = 8;

fn builtin_rules() -> Result<Vec<SanitizationRule>> {
    let video_domain = r"(?:www\.|m\.)?(?:youtube\.com|youtu\.be)";
    // A scheme may be glued to the preceding word; a bare host may not.
    let video_host = format!(r"(?:https?://{0}|\b{0})", video_domain);
    let score = r"(?:match|similarity|confidence)";
    let value = r"\d+(?:\.\d+)?%?";
    let table: Vec<(&str, String, Replacement)> = vec![
        (
            "diagnostic-score",
            format!(
                r"(?i)[ \t]*(?:[(\[][ \t]*(?:faq[ \t]+)?{0}(?:[ \t]+score)?[ \t]*[:=][ \t]*{1}[ \t]*[)\]]|\bfaq[ \t]+{0}(?:[ \t]+score)?[ \t]*[:=][ \t]*{1}|\b{0}(?:_score)?={1})",
                score, value
            ),
            Replacement::Template(String::new()),
        ),
        (
            "diagnostic-tag",
            r"(?i)[ \t]*\[(?:faq|cached|source:\s*faq)[^\]\n]*\]".to_string(),
            Replacement::Template(String::new()),
        ),
        (
            "markdown-video-link",
            format!(r"(?i)\[([^\]\n]+)\]\(\s*(?:https?://)?{}[^)\s]*\s*\)", video_domain),
            Replacement::LabelledNotice(NoticeKind::Video),
        ),
        (
            "markdown-link",
            r"(?i)\[([^\]\n]+)\]\(\s*(?:https?://|www\.)[^)\s]*\s*\)".to_string(),
            Replacement::LabelledNotice(NoticeKind::Link),
        ),
        (
            "video-url",
            format!(r"(?i){}(?:/{}{})?", video_host, URL_BODY, URL_END),
            Replacement::Notice(NoticeKind::Video),
        ),
        (
            "url",
            format!(r"(?i)(?:https?://|\bwww\.){}{}", URL_BODY, URL_END),
            Replacement::Notice(NoticeKind::Link),
        ),
    ];

    table
        .into_iter()
        .map(|(name, pattern, replacement)| {
            let pattern = Regex::new(&pattern)
                .with_context(|| format!("Invalid built-in sanitizer rule '{}'", name))?;
            Ok(SanitizationRule {
                name: name.to_string(),
                pattern,
                replacement,
            })
        })
        .collect()
}

fn blank_run_rule() -> Result<SanitizationRule> {
    Ok(SanitizationRule {
        name: "blank-lines".to_string(),
        pattern: Regex::new(r"\n(?:[ \t]*\n){2,}").context("Invalid blank-line rule")?,
        replacement: Replacement::Template("\n\n".to_string()),
    })
}

pub struct ResponseSanitizer {
    rules: Vec<SanitizationRule>,
}

impl ResponseSanitizer {
    pub fn new(config: &SanitizerConfig) -> Result<Self> {
        let mut rules = builtin_rules()?;
        for (i, extra) in config.extra_rules.iter().enumerate() {
            let pattern = Regex::new(&extra.pattern)
                .with_context(|| format!("Invalid sanitizer.extra_rules[{}] pattern", i))?;
            rules.push(SanitizationRule {
                name: format!("extra-{}", i),
                pattern,
                replacement: Replacement::Template(extra.replacement.clone()),
            });
        }
        rules.push(blank_run_rule()?);
        Ok(Self { rules })
    }

    pub fn rules(&self) -> &[SanitizationRule] {
        &self.rules
    }

    /// Rewrite `text` so no clickable external reference survives.
    ///
    /// Passes repeat until the text stops changing.
    pub fn sanitize(&self, text: &str, register: ScriptTag) -> String {
        let mut out = self.apply_rules(text, register);
        for _ in 1..MAX_PASSES {
            let next = self.apply_rules(&out, register);
            if next == out {
                break;
            }
            out = next;
        }
        out
    }

    fn apply_rules(&self, text: &str, register: ScriptTag) -> String {
        let mut out = text.to_string();
        for rule in &self.rules {
            if !rule.pattern.is_match(&out) {
                continue;
            }
            let replaced = match &rule.replacement {
                Replacement::Template(template) => {
                    rule.pattern.replace_all(&out, template.as_str()).into_owned()
                }
                Replacement::Notice(kind) => {
                    let text = notice(*kind, register);
                    rule.pattern.replace_all(&out, text).into_owned()
                }
                Replacement::LabelledNotice(kind) => {
                    let text = notice(*kind, register);
                    rule.pattern
                        .replace_all(&out, |caps: &Captures<'_>| {
                            let label = caps.get(1).map(|m| m.as_str().trim()).unwrap_or("");
                            if label.is_empty() {
                                text.to_string()
                            } else {
                                format!("{} {}", label, text)
                            }
                        })
                        .into_owned()
                }
            };
            debug!(rule = rule.name.as_str(), "sanitizer rule applied");
            out = replaced;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExtraRule;

    fn sanitizer() -> ResponseSanitizer {
        ResponseSanitizer::new(&SanitizerConfig::default()).unwrap()
    }

    fn has_url(text: &str) -> bool {
        Regex::new(r"(?i)https?://[^\s]+").unwrap().is_match(text)
    }

    #[test]
    fn test_video_url_replaced_surrounding_text_intact() {
        let out = sanitizer().sanitize("Check https://youtu.be/abc123 for more", ScriptTag::Latin);
        assert_eq!(out, "Check (search for this video on YouTube) for more");
    }

    #[test]
    fn test_generic_url_keeps_trailing_punctuation() {
        let out = sanitizer().sanitize("See https://example.com/a?b=c.", ScriptTag::Latin);
        assert_eq!(out, "See (search online for this).");
    }

    #[test]
    fn test_markdown_links_keep_label() {
        let s = sanitizer();
        assert_eq!(
            s.sanitize("Watch [the speech](https://www.youtube.com/watch?v=x) now", ScriptTag::Latin),
            "Watch the speech (search for this video on YouTube) now"
        );
        assert_eq!(
            s.sanitize("Read [the budget](https://mof.gov.np/budget)", ScriptTag::Latin),
            "Read the budget (search online for this)"
        );
    }

    #[test]
    fn test_notice_follows_register() {
        let s = sanitizer();
        let ne = s.sanitize("हेर्नुहोस् https://youtu.be/x", ScriptTag::Native);
        assert!(ne.contains("यो भिडियो YouTube मा खोज्नुहोस्"));
        let np = s.sanitize("yo hernus www.example.com", ScriptTag::Romanized);
        assert_eq!(np, "yo hernus (yesbare online khojnuhos)");
    }

    #[test]
    fn test_diagnostic_markers_removed() {
        let s = sanitizer();
        assert_eq!(
            s.sanitize("Kancha AI is a chatbot. (match score: 0.87)", ScriptTag::Latin),
            "Kancha AI is a chatbot."
        );
        assert_eq!(
            s.sanitize("Hello there [FAQ hit]", ScriptTag::Latin),
            "Hello there"
        );
    }

    #[test]
    fn test_glued_urls_replaced_whole() {
        let s = sanitizer();
        assert_eq!(
            s.sanitize("v2https://youtu.be/abc", ScriptTag::Latin),
            "v2(search for this video on YouTube)"
        );
        assert_eq!(
            s.sanitize("हेर्नुहोस्https://example.com/x", ScriptTag::Native),
            "हेर्नुहोस्(यसबारे अनलाइन खोज्नुहोस्)"
        );
        // A bare host still needs a word boundary.
        assert_eq!(s.sanitize("notyoutube.com", ScriptTag::Latin), "notyoutube.com");
    }

    #[test]
    fn test_prose_with_scores_survives() {
        let s = sanitizer();
        let prose = [
            "Nepal won the match: 3 goals to 1.",
            "The survey had a confidence: 95% level.",
            "Similarity = 2 shapes with equal angles.",
        ];
        for text in prose {
            assert_eq!(s.sanitize(text, ScriptTag::Latin), text);
        }
        assert_eq!(
            s.sanitize("Namaste! faq match score: 0.93", ScriptTag::Latin),
            "Namaste!"
        );
        assert_eq!(s.sanitize("ok similarity=0.91", ScriptTag::Latin), "ok");
    }

    #[test]
    fn test_nested_markers_removed_completely() {
        let s = sanitizer();
        assert_eq!(s.sanitize("[[FAQ]FAQ]", ScriptTag::Latin), "");
        assert_eq!(s.sanitize("x [[[cached]cached]faq] y", ScriptTag::Latin), "x y");
    }

    #[test]
    fn test_blank_line_runs_collapsed() {
        let out = sanitizer().sanitize("a\n\n\n\nb\n \n\t\nc", ScriptTag::Latin);
        assert_eq!(out, "a\n\nb\n\nc");
    }

    #[test]
    fn test_no_url_survives() {
        let s = sanitizer();
        let inputs = [
            "plain http://a.b",
            "https://x.com/path?q=1#frag and https://youtube.com/watch?v=2",
            "[https://x.com](https://x.com)",
            "(https://nested.example.com/x)",
            "link:https://foo.np/bar.pdf.",
            "HTTPS://UPPER.EXAMPLE.COM",
            "हेर्नुहोस्https://example.com/x",
            "seehttps://evil.example.com",
            "v2https://youtu.be/abc",
            "भिडियोhttps://www.youtube.com/watch?v=9",
        ];
        for input in inputs {
            for register in ScriptTag::ALL {
                let out = s.sanitize(input, register);
                assert!(!has_url(&out), "{:?} -> {:?}", input, out);
            }
        }
    }

    #[test]
    fn test_idempotent() {
        let s = sanitizer();
        let inputs = [
            "Check https://youtu.be/abc123 for more",
            "[label](https://www.youtube.com/x) and [b](www.site.com)\n\n\n\nend",
            "similarity=0.91 text www.x.org, more (confidence score: 88%)",
            "नमस्ते https://nepal.gov.np/",
            "[[FAQ]FAQ]",
            "a (match score: [FAQ]0.5) b",
            "",
        ];
        for input in inputs {
            for register in ScriptTag::ALL {
                let once = s.sanitize(input, register);
                assert_eq!(s.sanitize(&once, register), once, "input {:?}", input);
            }
        }
    }

    #[test]
    fn test_extra_rules_run_before_blank_collapse() {
        let config = SanitizerConfig {
            extra_rules: vec![ExtraRule {
                pattern: r"(?i)as an ai language model,?\s*".to_string(),
                replacement: String::new(),
            }],
        };
        let s = ResponseSanitizer::new(&config).unwrap();
        assert_eq!(s.rules().last().unwrap().name, "blank-lines");
        assert_eq!(
            s.sanitize("As an AI language model, I think so.", ScriptTag::Latin),
            "I think so."
        );
    }

    #[test]
    fn test_invalid_extra_rule_rejected() {
        let config = SanitizerConfig {
            extra_rules: vec![ExtraRule {
                pattern: "(".to_string(),
                replacement: String::new(),
            }],
        };
        assert!(ResponseSanitizer::new(&config).is_err());
    }
}
