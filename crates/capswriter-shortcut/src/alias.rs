//! Modifier alias groups: left/right variants of a modifier are
//! interchangeable for combo matching (§4.2).

/// Normalizes a raw key name to its alias group. Non-modifier keys and
/// toggle keys (Caps/Num/Scroll Lock) pass through unchanged.
pub fn normalize(key: &str) -> &str {
    match key {
        "ctrl" | "ctrl_l" | "ctrl_r" => "ctrl",
        "cmd" | "cmd_l" | "cmd_r" | "super" | "super_l" | "super_r" | "win" => "cmd",
        "alt" | "alt_l" | "alt_r" => "alt",
        "shift" | "shift_l" | "shift_r" => "shift",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn left_and_right_modifiers_collapse_to_the_same_group() {
        assert_eq!(normalize("ctrl_l"), normalize("ctrl_r"));
        assert_eq!(normalize("shift_r"), "shift");
        assert_eq!(normalize("cmd_l"), "cmd");
    }

    #[test]
    fn non_modifier_keys_pass_through() {
        assert_eq!(normalize("caps_lock"), "caps_lock");
        assert_eq!(normalize("r"), "r");
    }
}
