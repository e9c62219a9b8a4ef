//! "Did you mean" helpers for operator-typed names

use strsim::levenshtein;

/// Find the closest candidate by case-insensitive edit distance.
/// Only suggests when the distance is reasonable (< 4).
pub fn closest_match<'a, I>(input: &str, candidates: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a String>,
{
    let input_lower = input.to_lowercase();
    let mut best: Option<(&'a str, usize)> = None;

    for candidate in candidates {
        let distance = levenshtein(&input_lower, &candidate.to_lowercase());
        match best {
            Some((_, best_dist)) if distance >= best_dist => {}
            _ => best = Some((candidate.as_str(), distance)),
        }
    }

    best.and_then(|(name, dist)| if dist < 4 { Some(name) } else { None })
}

/// Build an "unknown X" message listing what is available plus the closest match.
pub fn unknown_name_message<'a, I>(what: &str, input: &str, candidates: I) -> String
where
    I: IntoIterator<Item = &'a String> + Clone,
{
    let available: Vec<&str> = candidates.clone().into_iter().map(String::as_str).collect();
    let mut msg = format!(
        "Unknown {}: '{}'. Available: {}",
        what,
        input,
        if available.is_empty() {
            "none".to_string()
        } else {
            available.join(", ")
        }
    );
    if let Some(closest) = closest_match(input, candidates) {
        msg.push_str(&format!(". Did you mean '{}'?", closest));
    }
    msg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suggests_near_miss() {
        let units = vec!["Sales".to_string(), "Human Resources".to_string()];
        assert_eq!(closest_match("sale", &units), Some("Sales"));
        assert_eq!(closest_match("Engineering", &units), None);
    }

    #[test]
    fn message_includes_suggestion() {
        let models = vec!["RandomForest".to_string(), "GradientBoosting".to_string()];
        let msg = unknown_name_message("model", "RandomForst", &models);
        assert!(msg.contains("Did you mean 'RandomForest'?"));
        assert!(msg.contains("GradientBoosting"));
    }
}
