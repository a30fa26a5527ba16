//! Key names accepted by the `key` primitive, mapped to Android keycodes.

pub const KEYCODE_HOME: u16 = 3;
pub const KEYCODE_BACK: u16 = 4;
pub const KEYCODE_0: u16 = 7;
pub const KEYCODE_DPAD_UP: u16 = 19;
pub const KEYCODE_DPAD_DOWN: u16 = 20;
pub const KEYCODE_DPAD_LEFT: u16 = 21;
pub const KEYCODE_DPAD_RIGHT: u16 = 22;
pub const KEYCODE_VOLUME_UP: u16 = 24;
pub const KEYCODE_VOLUME_DOWN: u16 = 25;
pub const KEYCODE_POWER: u16 = 26;
pub const KEYCODE_A: u16 = 29;
pub const KEYCODE_TAB: u16 = 61;
pub const KEYCODE_SPACE: u16 = 62;
pub const KEYCODE_ENTER: u16 = 66;
pub const KEYCODE_DEL: u16 = 67;
pub const KEYCODE_MENU: u16 = 82;
pub const KEYCODE_ESCAPE: u16 = 111;
pub const KEYCODE_APP_SWITCH: u16 = 187;

/// Case-insensitive lookup; single letters and digits map directly.
pub fn keycode_for(name: &str) -> Option<u16> {
    let upper = name.trim().to_ascii_uppercase();
    let code = match upper.as_str() {
        "SPACE" => KEYCODE_SPACE,
        "ENTER" | "RETURN" => KEYCODE_ENTER,
        "ESC" | "ESCAPE" => KEYCODE_ESCAPE,
        "BACK" => KEYCODE_BACK,
        "HOME" => KEYCODE_HOME,
        "MENU" => KEYCODE_MENU,
        "TAB" => KEYCODE_TAB,
        "DEL" | "BACKSPACE" => KEYCODE_DEL,
        "UP" => KEYCODE_DPAD_UP,
        "DOWN" => KEYCODE_DPAD_DOWN,
        "LEFT" => KEYCODE_DPAD_LEFT,
        "RIGHT" => KEYCODE_DPAD_RIGHT,
        "VOLUME_UP" => KEYCODE_VOLUME_UP,
        "VOLUME_DOWN" => KEYCODE_VOLUME_DOWN,
        "POWER" => KEYCODE_POWER,
        "APP_SWITCH" => KEYCODE_APP_SWITCH,
        single if single.len() == 1 => {
            let c = single.as_bytes()[0];
            match c {
                b'0'..=b'9' => KEYCODE_0 + (c - b'0') as u16,
                b'A'..=b'Z' => KEYCODE_A + (c - b'A') as u16,
                _ => return None,
            }
        }
        _ => return None,
    };
    Some(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn letters_digits_and_named_keys() {
        assert_eq!(keycode_for("w"), Some(51));
        assert_eq!(keycode_for("A"), Some(KEYCODE_A));
        assert_eq!(keycode_for("z"), Some(54));
        assert_eq!(keycode_for("0"), Some(KEYCODE_0));
        assert_eq!(keycode_for("9"), Some(16));
        assert_eq!(keycode_for("Esc"), Some(KEYCODE_ESCAPE));
        assert_eq!(keycode_for(" back "), Some(KEYCODE_BACK));
    }

    #[test]
    fn unknown_names_are_rejected() {
        assert_eq!(keycode_for(""), None);
        assert_eq!(keycode_for("F13"), None);
        assert_eq!(keycode_for("!"), None);
    }
}
