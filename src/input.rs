use crate::KEY_COUNT;
use std::collections::HashMap;

/// Generates a keymap from a mapping of QWERTY keys to CHIP-8 key codes,
/// represented as a [`HashMap`](std::collections::HashMap).
macro_rules! keymap {
    ($($key:literal => $mapping:literal),*) => {
        lazy_static::lazy_static! {
            /// A mapping of QWERTY keys to the CHIP-8 key they represent.
            pub static ref KEYMAP: HashMap<char, u8> = {
                let mut m = HashMap::new();
                $(
                  m.insert($key, $mapping);
                )*
                m
            };
        }
    };
}

keymap! {
    '1' => 0x1,
    '2' => 0x2,
    '3' => 0x3,
    '4' => 0xC,
    'q' => 0x4,
    'w' => 0x5,
    'e' => 0x6,
    'r' => 0xD,
    'a' => 0x7,
    's' => 0x8,
    'd' => 0x9,
    'f' => 0xE,
    'z' => 0xA,
    'x' => 0x0,
    'c' => 0xB,
    'v' => 0xF
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[error("'{0}' is not mapped to a key (expected one of 1234 qwer asdf zxcv)")]
pub struct UnmappedKey(pub char);

/// Builds a key vector with every key named in `keys` held down.
pub fn held(keys: &str) -> Result<[bool; KEY_COUNT], UnmappedKey> {
    let mut state = [false; KEY_COUNT];
    for c in keys.chars().filter(|c| !c.is_whitespace()) {
        let key = KEYMAP
            .get(&c.to_ascii_lowercase())
            .ok_or(UnmappedKey(c))?;
        state[*key as usize] = true;
    }
    Ok(state)
}
