//! Namespace Selector (C4, §4.4).
//!
//! A pure function mapping `(endpoint, request shape, user shape)` to an
//! ordered list of 1–5 knowledge-base partitions to query. No I/O, no
//! clock, no randomness — identical inputs always produce a byte-identical
//! output (§4.4 "Determinism", §8 invariant 4).

use serde::{Deserialize, Serialize};

/// Caller's self-reported experience level, part of the user-shape input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Experience {
    #[default]
    Beginner,
    Intermediate,
    Advanced,
}

/// The salient user-shape fields the selector reads (§4.4 "Inputs").
#[derive(Debug, Clone, Default)]
pub struct UserShape {
    pub experience: Experience,
    pub has_active_injury: bool,
    pub active_program_type: Option<String>,
    pub primary_goal: Option<String>,
}

/// The request fields the selector reads (§4.4 "Inputs"). Deliberately a
/// small typed record rather than a duck-typed map — see SPEC_FULL.md §2 /
/// DESIGN.md on replacing the dynamic-language dict-shaped request with a
/// tagged record per the §9 re-architecture note.
#[derive(Debug, Clone, Default)]
pub struct RequestShape {
    /// Natural-language query text, passed through to the search
    /// collaborator by C5. Not read by the selector itself.
    pub query: String,
    pub is_programming_question: bool,
    pub mentions_heat_or_elevation_signal: bool,
    pub is_nutrition_adjacent: bool,
}

const MAX_NAMESPACES: usize = 5;

/// Static per-endpoint base sets (§4.4 step 1). Endpoints not listed here
/// fall back to [`default_base_set`].
fn base_set(endpoint: &str) -> Vec<&'static str> {
    match endpoint {
        "/api/coach/ask" => vec!["strength-fundamentals", "squat-technique"],
        "/api/program/generate" => vec!["program-design", "periodization"],
        "/api/injury/analyze" => vec!["injury-management", "anatomy"],
        "/api/running/analyze" => vec!["running-form", "training-load"],
        "/api/workout/insights" => vec!["workout-analytics", "progressive-overload"],
        "/api/chat/swap-exercise-enhanced" => vec!["exercise-library", "biomechanics"],
        _ => default_base_set(),
    }
}

/// Fallback base set for unrecognized or malformed endpoints (§4.4
/// "Failure": never raise, return the endpoint's base set).
fn default_base_set() -> Vec<&'static str> {
    vec!["general-fitness", "exercise-library"]
}

/// Select an ordered list of 1–5 namespaces for `endpoint`.
///
/// Never raises: malformed/empty inputs just fail to trigger the dynamic
/// augmentations and the base set is returned (§4.4 "Failure").
pub fn select(endpoint: &str, request: &RequestShape, user: &UserShape) -> Vec<String> {
    let mut namespaces: Vec<&'static str> = base_set(endpoint);

    // Dynamic augmentations, applied in the fixed priority order named by
    // §4.4 step 2, each a no-op if the namespace is already present.
    let mut push_unique = |ns: &'static str, list: &mut Vec<&'static str>| {
        if !list.contains(&ns) {
            list.push(ns);
        }
    };

    if user.has_active_injury {
        push_unique("injury-management", &mut namespaces);
    }
    if request.is_programming_question && user.experience == Experience::Beginner {
        push_unique("strength-fundamentals", &mut namespaces);
    }
    if endpoint.contains("running") && request.mentions_heat_or_elevation_signal {
        push_unique("environment", &mut namespaces);
    }
    if request.is_nutrition_adjacent {
        push_unique("nutrition", &mut namespaces);
    }

    namespaces.truncate(MAX_NAMESPACES);
    namespaces.into_iter().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_b_inputs_select_expected_namespaces() {
        let request = RequestShape { is_programming_question: true, ..Default::default() };
        let user = UserShape { experience: Experience::Beginner, ..Default::default() };
        let selected = select("/api/coach/ask", &request, &user);
        assert_eq!(selected, vec!["strength-fundamentals", "squat-technique"]);
    }

    #[test]
    fn missing_optional_fields_returns_base_set() {
        let selected = select("/api/coach/ask", &RequestShape::default(), &UserShape::default());
        assert_eq!(selected, vec!["strength-fundamentals", "squat-technique"]);
    }

    #[test]
    fn pure_function_same_inputs_same_output() {
        let request = RequestShape {
            is_programming_question: true,
            mentions_heat_or_elevation_signal: true,
            is_nutrition_adjacent: true,
            ..Default::default()
        };
        let user = UserShape {
            experience: Experience::Beginner,
            has_active_injury: true,
            active_program_type: Some("hypertrophy".into()),
            primary_goal: Some("strength".into()),
        };
        let a = select("/api/running/analyze", &request, &user);
        let b = select("/api/running/analyze", &request, &user);
        assert_eq!(a, b);
    }

    #[test]
    fn caps_at_five_namespaces() {
        let request = RequestShape {
            is_programming_question: true,
            mentions_heat_or_elevation_signal: true,
            is_nutrition_adjacent: true,
            ..Default::default()
        };
        let user = UserShape {
            experience: Experience::Beginner,
            has_active_injury: true,
            ..Default::default()
        };
        let selected = select("/api/running/analyze", &request, &user);
        assert!(selected.len() <= 5);
    }

    #[test]
    fn unknown_endpoint_returns_default_base_set() {
        let selected = select("/api/unknown/path", &RequestShape::default(), &UserShape::default());
        assert_eq!(selected, vec!["general-fitness", "exercise-library"]);
    }
}
