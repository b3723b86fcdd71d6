//! Derivation of unique names for generated script resources.

use aurorakit_erf::{
    dialogue::INDEX_SEPARATOR,
    key::RESREF_MAX_LENGTH,
    strip::GENERATED_PREFIX,
};

/// Derives the resource name for the `counter`-th script generated in this build, from
/// the identifier of the record that will reference it.
///
/// The receiver's index suffix and extension are stripped, the generated marker is
/// prefixed, and a base-36 counter is appended. When the result would not fit the key
/// table, the base is truncated rather than the counter suffix, so uniqueness is never
/// sacrificed for length.
pub fn derive_script_name(receiver_id: &str, counter: u32) -> String {
    let base = receiver_id
        .split(INDEX_SEPARATOR)
        .next()
        .unwrap_or(receiver_id);
    let base = base.rsplit_once('.').map_or(base, |(stem, _)| stem);
    let base = base.to_lowercase();

    let suffix = format!("_{}", to_base36(counter));
    let name = format!("{GENERATED_PREFIX}{base}{suffix}");
    if name.len() <= RESREF_MAX_LENGTH {
        return name;
    }

    let keep = RESREF_MAX_LENGTH - GENERATED_PREFIX.len() - suffix.len();
    format!("{GENERATED_PREFIX}{}{suffix}", &base[..keep])
}

fn to_base36(mut value: u32) -> String {
    let mut digits = vec![];
    loop {
        let digit = char::from_digit(value % 36, 36).unwrap();
        digits.push(digit);
        value /= 36;
        if value == 0 {
            break;
        }
    }
    digits.iter().rev().collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn strips_extension_and_index_suffix() {
        assert_eq!(derive_script_name("chest001.UTP", 0), "se_chest001_0");
        assert_eq!(derive_script_name("convo.DLG#0#1", 3), "se_convo_3");
    }

    #[test]
    fn counter_is_base36() {
        assert_eq!(derive_script_name("a", 35), "se_a_z");
        assert_eq!(derive_script_name("a", 36), "se_a_10");
    }

    #[test]
    fn truncation_never_collides_and_never_overflows() {
        let mut seen = HashSet::new();
        for counter in 0..500 {
            let name = derive_script_name("averylongblueprintname.UTC", counter);
            assert!(name.len() <= RESREF_MAX_LENGTH, "{name:?} is too long");
            assert!(name.starts_with(GENERATED_PREFIX));
            assert!(seen.insert(name), "collision at counter {counter}");
        }
    }

    #[test]
    fn suffix_survives_truncation() {
        let name = derive_script_name("averylongblueprintname.UTC", 1295);
        assert!(name.ends_with("_zz"));
        assert_eq!(name.len(), RESREF_MAX_LENGTH);
    }
}
