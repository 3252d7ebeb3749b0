use crate::bleed::{BleedAssessment, BleedLabel};

/// Renders the one-line quality summary for a set of assessed stems.
///
/// Stems partition into clean and not-clean; the bleed clause only appears
/// when something actually tripped. Ordering follows the caller's iteration
/// order. Pure function, no failure modes.
pub fn quality_report<'a, I>(entries: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a BleedAssessment)>,
{
    let mut good: Vec<&str> = Vec::new();
    let mut bleed: Vec<&str> = Vec::new();

    for (name, assessment) in entries {
        if assessment.label == BleedLabel::Good {
            good.push(name);
        } else {
            bleed.push(name);
        }
    }

    let mut report = format!(
        "Clean separation: {}",
        if good.is_empty() {
            "None".to_string()
        } else {
            good.join(", ")
        }
    );
    if !bleed.is_empty() {
        report.push_str(&format!(" | Bleed detected: {}", bleed.join(", ")));
    }
    report
}
