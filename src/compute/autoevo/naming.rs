//! Latin-ish names for new species.

use crate::compute::rng::EvoRng;

static PREFIXES: &[&str] = &[
    "aer", "alb", "amph", "arc", "aur", "bac", "cal", "cer", "chlor", "cil", "cyan", "dict",
    "erg", "fer", "flav", "gel", "gran", "hal", "hel", "hydr", "lamp", "lept", "luc", "mar",
    "micr", "mon", "myx", "nas", "neb", "noct", "ost", "pal", "phot", "plac", "pyr", "rub",
    "sacc", "sil", "spir", "strept", "sulf", "therm", "trich", "umbr", "vel", "vir", "xer",
];

static MIDDLES: &[&str] = &[
    "a", "e", "i", "o", "u", "ae", "ia", "io", "ul", "ol", "an", "en", "in", "ar", "or", "il",
];

static SUFFIXES: &[&str] = &[
    "us", "um", "a", "is", "ens", "ans", "ium", "ella", "ulus", "oides", "ensis", "icus",
    "atus", "osa", "ix", "ax",
];

/// A fresh epithet built from random parts.
pub fn random_epithet(rng: &mut EvoRng) -> String {
    let mut name = String::new();
    name.push_str(pick(rng, PREFIXES));
    if rng.chance(0.6) {
        name.push_str(pick(rng, MIDDLES));
    }
    name.push_str(pick(rng, SUFFIXES));
    name
}

/// Mutate `epithet` a little so relatives keep recognisably similar names.
///
/// Keeps the leading stem and replaces the ending. Falls back to a fresh
/// epithet when nothing recognisable is left.
pub fn mutate_epithet(epithet: &str, rng: &mut EvoRng) -> String {
    let stem: String = strip_suffix(&epithet.to_lowercase()).to_string();
    let chars: Vec<char> = stem.chars().collect();
    if chars.len() < 3 {
        return random_epithet(rng);
    }

    // Drop up to two trailing letters of the stem, then append new parts.
    let keep = chars.len() - rng.index(chars.len().min(3)).min(2);
    let base: String = chars[..keep].iter().collect();
    let middle = if rng.chance(0.5) { pick(rng, MIDDLES) } else { "" };
    let suffix = pick(rng, SUFFIXES);
    let mut name = format!("{base}{middle}{suffix}");
    if name == epithet {
        name = format!("{base}{middle}i{suffix}");
    }

    if name.len() > 24 {
        return random_epithet(rng);
    }
    name
}

fn strip_suffix(word: &str) -> &str {
    SUFFIXES
        .iter()
        .filter(|suffix| word.len() > suffix.len() + 2 && word.ends_with(*suffix))
        .max_by_key(|suffix| suffix.len())
        .map(|suffix| &word[..word.len() - suffix.len()])
        .unwrap_or(word)
}

fn pick(rng: &mut EvoRng, words: &'static [&'static str]) -> &'static str {
    rng.choose(words).copied().unwrap_or("")
}
