//! Numeric-aware ordering for chapter and page names.
//!
//! Names are split into alternating text and digit runs. Digit runs compare
//! as integers, text runs compare case-insensitively, so `ch2` sorts before
//! `ch10` and `Page1` sits next to `page1`.

use std::cmp::Ordering;

#[derive(Debug, PartialEq, Eq)]
enum Run<'a> {
    Text(&'a str),
    Number(&'a str),
}

fn runs(s: &str) -> Vec<Run<'_>> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut in_digits: Option<bool> = None;

    for (idx, ch) in s.char_indices() {
        let digit = ch.is_ascii_digit();
        match in_digits {
            Some(prev) if prev != digit => {
                out.push(make_run(&s[start..idx], prev));
                start = idx;
            }
            _ => {}
        }
        in_digits = Some(digit);
    }

    if let Some(digit) = in_digits {
        out.push(make_run(&s[start..], digit));
    }

    out
}

fn make_run(part: &str, digit: bool) -> Run<'_> {
    if digit {
        Run::Number(part)
    } else {
        Run::Text(part)
    }
}

/// Compare two digit strings by numeric value without parsing, so runs
/// longer than `u64` still order correctly.
fn cmp_numeric(a: &str, b: &str) -> Ordering {
    let a_trim = a.trim_start_matches('0');
    let b_trim = b.trim_start_matches('0');
    a_trim
        .len()
        .cmp(&b_trim.len())
        .then_with(|| a_trim.cmp(b_trim))
}

fn cmp_text(a: &str, b: &str) -> Ordering {
    a.chars()
        .flat_map(char::to_lowercase)
        .cmp(b.chars().flat_map(char::to_lowercase))
}

/// Natural ordering of two names.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let left = runs(a);
    let right = runs(b);

    for (l, r) in left.iter().zip(right.iter()) {
        let ord = match (l, r) {
            (Run::Number(x), Run::Number(y)) => cmp_numeric(x, y),
            (Run::Text(x), Run::Text(y)) => cmp_text(x, y),
            (Run::Number(_), Run::Text(_)) => Ordering::Less,
            (Run::Text(_), Run::Number(_)) => Ordering::Greater,
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }

    left.len().cmp(&right.len())
}

/// Sort names in place using [`natural_cmp`].
pub fn sort_natural(names: &mut [String]) {
    names.sort_by(|a, b| natural_cmp(a, b));
}
