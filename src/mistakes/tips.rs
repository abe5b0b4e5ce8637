/// Drops ARPAbet stress digits: `AH0` becomes `AH`.
pub fn strip_stress(phoneme: &str) -> String {
    phoneme.chars().filter(|c| !c.is_ascii_digit()).collect()
}

/// Articulation hint used whenever the external tip generator is unavailable.
pub fn fallback_tip(phoneme: &str) -> String {
    let tip = match strip_stress(phoneme).to_uppercase().as_str() {
        "TH" => "Put your tongue between your teeth and blow air.",
        "DH" => "Put tongue between teeth, add voice for 'TH' in 'the'.",
        "R" => "Curl your tongue back slightly.",
        "L" => "Touch tongue tip to the roof of your mouth.",
        "SH" => "Round your lips and push air through.",
        "CH" => "Start with tongue at roof, release with 'SH'.",
        "S" => "Keep tongue behind teeth for a clear 'S'.",
        "Z" => "Add voice to the 'S' sound.",
        "NG" => "Sound comes from back of throat.",
        "W" => "Round your lips like saying 'oo'.",
        "Y" => "Touch tongue to roof, slide to the next sound.",
        "V" => "Touch upper teeth to lower lip, add voice.",
        "F" => "Touch upper teeth to lower lip, blow air.",
        _ => return format!("Practice the '{phoneme}' sound more carefully."),
    };
    tip.to_string()
}

/// A generated tip is usable if it is non-blank single-line text of sane length.
pub(crate) fn is_well_formed_tip(tip: &str) -> bool {
    let trimmed = tip.trim();
    !trimmed.is_empty() && trimmed.chars().count() <= 200 && !trimmed.contains('\n')
}
