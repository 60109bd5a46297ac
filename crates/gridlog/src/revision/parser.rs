//! The diff parser: HTML fragments in, typed change events out.
//!
//! Each activity's `diff_html` fragment renders one change the way the
//! platform's web UI shows it: a container per changed field carrying the
//! field label, a `data-columntype` attribute, and the rendered value
//! tokens, where removed (old) values are marked with an icon or a
//! strikethrough and added (new) values with an icon or nothing at all.
//!
//! The remote markup has drifted between marker conventions over time, so
//! the added/removed classification is a versioned [`PolarityRule`] instead
//! of a single hardcoded heuristic.
//!
//! A malformed fragment is never an error: it is logged and skipped so one
//! bad activity cannot abort a batch.

use scraper::{ElementRef, Html, Selector};
use uuid::Uuid;

use super::types::{ChangeEvent, FieldKind, RawActivity};

/// How value tokens are classified as added vs removed.
///
/// The platform's markup has used at least two incompatible conventions, so
/// the rule is explicit configuration rather than an assumption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PolarityRule {
    /// Prefer explicit added/removed icon markers, fall back to the
    /// strikethrough style, then treat unmarked tokens as added.
    #[default]
    IconMarker,
    /// Strikethrough style means removed; everything else is added.
    StrikethroughStyle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Polarity {
    Added,
    Removed,
}

/// Converts one raw activity into zero or more typed change events.
pub struct DiffParser {
    rule: PolarityRule,
    containers: Selector,
    fallback_containers: Selector,
    label: Selector,
    tokens: Selector,
    added_icon: Selector,
    removed_icon: Selector,
}

impl DiffParser {
    #[must_use]
    pub fn new(rule: PolarityRule) -> Self {
        Self {
            rule,
            containers: Selector::parse("div.historicalCellContainer")
                .expect("selector should parse"),
            fallback_containers: Selector::parse("[data-columntype]")
                .expect("selector should parse"),
            label: Selector::parse(".historicalCellLabel").expect("selector should parse"),
            tokens: Selector::parse(".historicalCellValue").expect("selector should parse"),
            added_icon: Selector::parse(".historicalAddedIcon").expect("selector should parse"),
            removed_icon: Selector::parse(".historicalRemovedIcon").expect("selector should parse"),
        }
    }

    /// Parse one activity's fragment into events for `record_id`.
    ///
    /// Activities touching fields other than assignee/status produce no
    /// events and no error; malformed containers are skipped with a warning.
    #[must_use]
    pub fn parse_activity(&self, record_id: &str, activity: &RawActivity) -> Vec<ChangeEvent> {
        let fragment = Html::parse_fragment(&activity.diff_html);

        let mut containers: Vec<ElementRef<'_>> = fragment.select(&self.containers).collect();
        if containers.is_empty() {
            // Older markup revisions drop the container class but keep the
            // column type attribute.
            containers = fragment.select(&self.fallback_containers).collect();
        }

        let mut events = Vec::new();
        for container in containers {
            match self.parse_container(record_id, activity, container) {
                Ok(Some(event)) => events.push(event),
                Ok(None) => {}
                Err(reason) => {
                    tracing::warn!(
                        activity_id = %activity.id,
                        record_id,
                        reason,
                        "skipping malformed diff fragment"
                    );
                }
            }
        }
        events
    }

    fn parse_container(
        &self,
        record_id: &str,
        activity: &RawActivity,
        container: ElementRef<'_>,
    ) -> Result<Option<ChangeEvent>, &'static str> {
        let column_type = container
            .value()
            .attr("data-columntype")
            .ok_or("container has no column type")?;

        let label = container
            .select(&self.label)
            .next()
            .map(element_text)
            .ok_or("container has no field label")?;

        let Some(field) = classify(&label, column_type) else {
            // Not a covered field kind; silently discarded by design.
            return Ok(None);
        };

        let mut old_value: Option<String> = None;
        let mut new_value: Option<String> = None;
        for token in container.select(&self.tokens) {
            let text = element_text(token);
            if text.is_empty() {
                continue;
            }
            // Two tokens of the same polarity are unexpected for these field
            // kinds; last one wins.
            match self.polarity(token) {
                Polarity::Removed => old_value = Some(text),
                Polarity::Added => new_value = Some(text),
            }
        }

        if old_value.is_none() && new_value.is_none() {
            return Ok(None);
        }

        Ok(Some(ChangeEvent {
            id: Uuid::new_v4(),
            record_id: record_id.to_string(),
            field,
            old_value,
            new_value,
            occurred_at: activity.created_at,
            actor: activity.actor.clone(),
        }))
    }

    fn polarity(&self, token: ElementRef<'_>) -> Polarity {
        match self.rule {
            PolarityRule::IconMarker => {
                if token.select(&self.removed_icon).next().is_some() {
                    Polarity::Removed
                } else if token.select(&self.added_icon).next().is_some() {
                    Polarity::Added
                } else if has_strikethrough(token) {
                    Polarity::Removed
                } else {
                    Polarity::Added
                }
            }
            PolarityRule::StrikethroughStyle => {
                if has_strikethrough(token) {
                    Polarity::Removed
                } else {
                    Polarity::Added
                }
            }
        }
    }
}

impl Default for DiffParser {
    fn default() -> Self {
        Self::new(PolarityRule::default())
    }
}

/// Classify a changed field by its display label and declared value type.
///
/// Labels compare case-insensitively; only link-valued "assignee"-ish fields
/// and choice-valued "status"-ish fields are covered.
fn classify(label: &str, column_type: &str) -> Option<FieldKind> {
    let label = label.to_lowercase();
    let column_type = column_type.to_lowercase();

    let link_valued = matches!(column_type.as_str(), "collaborator" | "foreignkey" | "link");
    let choice_valued = matches!(column_type.as_str(), "select" | "multiselect" | "choice");

    if (label.contains("assign") || label.contains("developer")) && link_valued {
        Some(FieldKind::Assignee)
    } else if label.contains("status") && choice_valued {
        Some(FieldKind::Status)
    } else {
        None
    }
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

fn has_strikethrough(token: ElementRef<'_>) -> bool {
    if token.value().classes().any(|c| c == "strikethrough") {
        return true;
    }
    token
        .value()
        .attr("style")
        .is_some_and(|style| style.contains("line-through"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn activity(diff_html: &str) -> RawActivity {
        RawActivity {
            id: "act1".to_string(),
            created_at: Utc::now(),
            actor: "ops@example.com".to_string(),
            diff_html: diff_html.to_string(),
        }
    }

    fn parse(html: &str) -> Vec<ChangeEvent> {
        DiffParser::default().parse_activity("rec1", &activity(html))
    }

    #[test]
    fn assignee_change_with_icon_markers() {
        let events = parse(
            r#"<div class="historicalCellContainer" data-columntype="collaborator">
                 <div class="historicalCellLabel">Assignee</div>
                 <span class="historicalCellValue"><i class="historicalRemovedIcon"></i>Alice</span>
                 <span class="historicalCellValue"><i class="historicalAddedIcon"></i>Bob</span>
               </div>"#,
        );

        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.field, FieldKind::Assignee);
        assert_eq!(event.old_value.as_deref(), Some("Alice"));
        assert_eq!(event.new_value.as_deref(), Some("Bob"));
        assert_eq!(event.actor, "ops@example.com");
        assert_eq!(event.record_id, "rec1");
    }

    #[test]
    fn status_change_with_strikethrough_markup() {
        let events = parse(
            r#"<div class="historicalCellContainer" data-columntype="select">
                 <div class="historicalCellLabel">Status</div>
                 <span class="historicalCellValue strikethrough">Todo</span>
                 <span class="historicalCellValue">In Progress</span>
               </div>"#,
        );

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].field, FieldKind::Status);
        assert_eq!(events[0].old_value.as_deref(), Some("Todo"));
        assert_eq!(events[0].new_value.as_deref(), Some("In Progress"));
    }

    #[test]
    fn inline_line_through_style_counts_as_removed() {
        let events = parse(
            r#"<div class="historicalCellContainer" data-columntype="select">
                 <div class="historicalCellLabel">Status</div>
                 <span class="historicalCellValue" style="text-decoration: line-through">Done</span>
               </div>"#,
        );

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].old_value.as_deref(), Some("Done"));
        assert_eq!(events[0].new_value, None);
    }

    #[test]
    fn unmarked_token_falls_back_to_added() {
        let events = parse(
            r#"<div class="historicalCellContainer" data-columntype="collaborator">
                 <div class="historicalCellLabel">Developer</div>
                 <span class="historicalCellValue">Carol</span>
               </div>"#,
        );

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].field, FieldKind::Assignee);
        assert_eq!(events[0].old_value, None);
        assert_eq!(events[0].new_value.as_deref(), Some("Carol"));
    }

    #[test]
    fn uncovered_field_kinds_produce_no_events() {
        // A date column, a text column, and a status label with the wrong
        // value type: none of these may yield events or errors.
        let events = parse(
            r#"<div class="historicalCellContainer" data-columntype="date">
                 <div class="historicalCellLabel">Due date</div>
                 <span class="historicalCellValue">2026-01-01</span>
               </div>
               <div class="historicalCellContainer" data-columntype="text">
                 <div class="historicalCellLabel">Notes</div>
                 <span class="historicalCellValue">hello</span>
               </div>
               <div class="historicalCellContainer" data-columntype="text">
                 <div class="historicalCellLabel">Status</div>
                 <span class="historicalCellValue">free text</span>
               </div>"#,
        );
        assert!(events.is_empty());
    }

    #[test]
    fn label_matching_is_case_insensitive() {
        let events = parse(
            r#"<div class="historicalCellContainer" data-columntype="Collaborator">
                 <div class="historicalCellLabel">ASSIGNED TO</div>
                 <span class="historicalCellValue">Dave</span>
               </div>"#,
        );
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].field, FieldKind::Assignee);
    }

    #[test]
    fn same_polarity_twice_last_one_wins() {
        let events = parse(
            r#"<div class="historicalCellContainer" data-columntype="select">
                 <div class="historicalCellLabel">Status</div>
                 <span class="historicalCellValue">First</span>
                 <span class="historicalCellValue">Second</span>
               </div>"#,
        );
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].new_value.as_deref(), Some("Second"));
    }

    #[test]
    fn empty_tokens_yield_no_event() {
        let events = parse(
            r#"<div class="historicalCellContainer" data-columntype="select">
                 <div class="historicalCellLabel">Status</div>
                 <span class="historicalCellValue">  </span>
               </div>"#,
        );
        assert!(events.is_empty());
    }

    #[test]
    fn malformed_fragments_are_skipped_not_fatal() {
        for html in [
            "",
            "not html at all <<<>>>",
            r#"<div class="historicalCellContainer" data-columntype="select"></div>"#,
            r#"<div data-columntype="select"><span class="historicalCellValue">x</span></div>"#,
        ] {
            let events = parse(html);
            assert!(events.is_empty(), "fragment should be skipped: {html:?}");
        }
    }

    #[test]
    fn fallback_container_without_class_is_still_found() {
        let events = parse(
            r#"<div data-columntype="multiselect">
                 <div class="historicalCellLabel">Status</div>
                 <span class="historicalCellValue strikethrough">Blocked</span>
                 <span class="historicalCellValue">Unblocked</span>
               </div>"#,
        );
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].old_value.as_deref(), Some("Blocked"));
        assert_eq!(events[0].new_value.as_deref(), Some("Unblocked"));
    }

    #[test]
    fn strikethrough_rule_ignores_icon_markers() {
        let html = r#"<div class="historicalCellContainer" data-columntype="select">
             <div class="historicalCellLabel">Status</div>
             <span class="historicalCellValue"><i class="historicalRemovedIcon"></i>Old</span>
           </div>"#;

        let by_icon = DiffParser::new(PolarityRule::IconMarker).parse_activity("rec1", &activity(html));
        assert_eq!(by_icon[0].old_value.as_deref(), Some("Old"));

        let by_style =
            DiffParser::new(PolarityRule::StrikethroughStyle).parse_activity("rec1", &activity(html));
        assert_eq!(by_style[0].new_value.as_deref(), Some("Old"));
        assert_eq!(by_style[0].old_value, None);
    }

    #[test]
    fn every_event_satisfies_the_value_invariant() {
        let events = parse(
            r#"<div class="historicalCellContainer" data-columntype="collaborator">
                 <div class="historicalCellLabel">Assignee</div>
                 <span class="historicalCellValue"><i class="historicalRemovedIcon"></i>Alice</span>
               </div>
               <div class="historicalCellContainer" data-columntype="select">
                 <div class="historicalCellLabel">Status</div>
                 <span class="historicalCellValue">Started</span>
               </div>"#,
        );
        assert_eq!(events.len(), 2);
        for event in &events {
            assert!(event.old_value.is_some() || event.new_value.is_some());
            assert!(matches!(event.field, FieldKind::Assignee | FieldKind::Status));
        }
    }
}
