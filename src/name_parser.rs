//! Splits a scraped team string into club identity and series suffix.
//!
//! Suffix rules live in an ordered table and the first rule that accepts the
//! normalized tokens wins. Keep more specific rules above generic ones: the
//! trailing-digits rule would otherwise swallow the digits of a `- 9 SW` series.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NamePattern {
    /// `Prairie Club SN (3)`
    SnParen,
    /// `Hinsdale PC II - 9 SW`
    RomanDashSw,
    /// `Hinsdale PC - 9 SW`
    DashSw,
    /// `Hinsdale PC II 9 SW`, the stored form of `RomanDashSw`
    RomanSw,
    /// `Hinsdale PC 9 SW`, the stored form of `DashSw`
    DigitsSw,
    /// `Evanston A(2)`
    LetterParen,
    /// `Glen View - 4`
    DashDigits,
    /// `Glen View 4` / `Glen View 4B`
    TrailingDigits,
    /// `Wilmette PD II`: the numeral belongs to the club name
    RomanBase,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedName {
    pub club_name: String,
    pub series_suffix: Option<String>,
    pub team_name: String,
    pub pattern: NamePattern,
}

struct Split {
    club: String,
    suffix: Option<String>,
    team: String,
}

struct SuffixRule {
    pattern: NamePattern,
    // None when the rule does not apply to the tokens.
    split: fn(&[String]) -> Option<Split>,
}

const RULES: &[SuffixRule] = &[
    SuffixRule {
        pattern: NamePattern::SnParen,
        split: split_sn_paren,
    },
    SuffixRule {
        pattern: NamePattern::RomanDashSw,
        split: split_roman_dash_sw,
    },
    SuffixRule {
        pattern: NamePattern::DashSw,
        split: split_dash_sw,
    },
    SuffixRule {
        pattern: NamePattern::RomanSw,
        split: split_roman_sw,
    },
    SuffixRule {
        pattern: NamePattern::DigitsSw,
        split: split_digits_sw,
    },
    SuffixRule {
        pattern: NamePattern::LetterParen,
        split: split_letter_paren,
    },
    SuffixRule {
        pattern: NamePattern::DashDigits,
        split: split_dash_digits,
    },
    SuffixRule {
        pattern: NamePattern::TrailingDigits,
        split: split_trailing_digits,
    },
    SuffixRule {
        pattern: NamePattern::RomanBase,
        split: split_roman_base,
    },
];

/// Parses a raw scraped name. Total: input no rule accepts comes back
/// verbatim as both club and team name with no suffix.
pub fn parse(raw_name: &str) -> ParsedName {
    let tokens = normalize_tokens(raw_name);
    for rule in RULES {
        if let Some(split) = (rule.split)(&tokens) {
            return ParsedName {
                club_name: split.club,
                series_suffix: split.suffix,
                team_name: split.team,
                pattern: rule.pattern,
            };
        }
    }
    ParsedName {
        club_name: raw_name.to_string(),
        series_suffix: None,
        team_name: raw_name.to_string(),
        pattern: NamePattern::Fallback,
    }
}

/// Whitespace, parenthesis, dash and marker-case normalization. Everything
/// else keeps its original casing.
pub fn normalize_tokens(raw: &str) -> Vec<String> {
    let collapsed = raw
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace("( ", "(")
        .replace(" )", ")");

    let words = collapsed.split(' ').filter(|w| !w.is_empty()).collect::<Vec<_>>();
    let mut out: Vec<String> = Vec::with_capacity(words.len() + 2);
    for (idx, word) in words.iter().enumerate() {
        if is_marker(word) {
            out.push(word.to_ascii_uppercase());
            continue;
        }
        // "SN(3)" -> "SN" "(3)"
        if word.len() > 2
            && word.is_char_boundary(2)
            && word[..2].eq_ignore_ascii_case("sn")
            && is_paren_digits(&word[2..])
        {
            out.push("SN".to_string());
            out.push(word[2..].to_string());
            continue;
        }
        // "-9" -> "-" "9"
        if let Some(rest) = word.strip_prefix('-')
            && is_digits(rest)
        {
            out.push("-".to_string());
            out.push(rest.to_string());
            continue;
        }
        // "II- 9" -> "II" "-" "9"
        if let Some(head) = word.strip_suffix('-')
            && !head.is_empty()
            && words
                .get(idx + 1)
                .is_some_and(|next| next.starts_with(|ch: char| ch.is_ascii_digit()))
        {
            out.push(head.to_string());
            out.push("-".to_string());
            continue;
        }
        // "A (2)" -> "A(2)"
        if is_paren_digits(word)
            && let Some(prev) = out.last_mut()
            && is_series_letter(prev)
        {
            prev.push_str(word);
            continue;
        }
        out.push((*word).to_string());
    }
    out
}

fn split_sn_paren(tokens: &[String]) -> Option<Split> {
    let [base @ .., sn, num] = tokens else {
        return None;
    };
    if !is_base(base) || sn != "SN" || !is_paren_digits(num) {
        return None;
    }
    Some(Split {
        club: base.join(" "),
        suffix: Some(format!("SN {num}")),
        team: tokens.join(" "),
    })
}

fn split_roman_dash_sw(tokens: &[String]) -> Option<Split> {
    let [base @ .., roman, dash, num, sw] = tokens else {
        return None;
    };
    if !is_base(base) || !is_roman(roman) || dash != "-" || !is_digits(num) || sw != "SW" {
        return None;
    }
    let club = base.join(" ");
    let suffix = format!("{roman} {num} SW");
    Some(Split {
        team: format!("{club} {suffix}"),
        club,
        suffix: Some(suffix),
    })
}

fn split_dash_sw(tokens: &[String]) -> Option<Split> {
    let [base @ .., dash, num, sw] = tokens else {
        return None;
    };
    if !is_base(base) || dash != "-" || !is_digits(num) || sw != "SW" {
        return None;
    }
    let club = base.join(" ");
    let suffix = format!("{num} SW");
    Some(Split {
        team: format!("{club} {suffix}"),
        club,
        suffix: Some(suffix),
    })
}

fn split_roman_sw(tokens: &[String]) -> Option<Split> {
    let [base @ .., roman, num, sw] = tokens else {
        return None;
    };
    if !is_base(base) || !is_roman(roman) || !is_digits(num) || sw != "SW" {
        return None;
    }
    Some(Split {
        club: base.join(" "),
        suffix: Some(format!("{roman} {num} SW")),
        team: tokens.join(" "),
    })
}

fn split_digits_sw(tokens: &[String]) -> Option<Split> {
    let [base @ .., num, sw] = tokens else {
        return None;
    };
    if !is_base(base) || !is_digits(num) || sw != "SW" {
        return None;
    }
    Some(Split {
        club: base.join(" "),
        suffix: Some(format!("{num} SW")),
        team: tokens.join(" "),
    })
}

fn split_letter_paren(tokens: &[String]) -> Option<Split> {
    let [base @ .., last] = tokens else {
        return None;
    };
    let open = last.find('(')?;
    if open == 0 || !is_paren_digits(&last[open..]) {
        return None;
    }
    let (head, paren) = last.split_at(open);
    let letter_at = head.len() - 1;
    if !head.is_char_boundary(letter_at) {
        return None;
    }
    let (glued, letter) = head.split_at(letter_at);
    if !is_series_letter(letter) {
        return None;
    }

    let mut club_tokens = base.iter().map(String::as_str).collect::<Vec<_>>();
    if !glued.is_empty() {
        club_tokens.push(glued);
    }
    if !is_base(club_tokens.as_slice()) {
        return None;
    }
    Some(Split {
        club: club_tokens.join(" "),
        suffix: Some(format!("{letter}{paren}")),
        team: tokens.join(" "),
    })
}

fn split_dash_digits(tokens: &[String]) -> Option<Split> {
    let [base @ .., dash, num] = tokens else {
        return None;
    };
    if !is_base(base) || dash != "-" || !is_digits(num) {
        return None;
    }
    let club = base.join(" ");
    Some(Split {
        team: format!("{club} {num}"),
        club,
        suffix: Some(num.clone()),
    })
}

fn split_trailing_digits(tokens: &[String]) -> Option<Split> {
    let [base @ .., last] = tokens else {
        return None;
    };
    if !is_base(base) || !is_series_number(last) {
        return None;
    }
    Some(Split {
        club: base.join(" "),
        suffix: Some(last.clone()),
        team: tokens.join(" "),
    })
}

fn split_roman_base(tokens: &[String]) -> Option<Split> {
    let [base @ .., last] = tokens else {
        return None;
    };
    if !is_base(base) || !is_roman(last) {
        return None;
    }
    let full = tokens.join(" ");
    Some(Split {
        club: full.clone(),
        suffix: None,
        team: full,
    })
}

// A club base needs at least one letter or digit; "- 9" is not a club.
fn is_base<S: AsRef<str>>(base: &[S]) -> bool {
    base.iter()
        .any(|token| token.as_ref().chars().any(char::is_alphanumeric))
}

fn is_marker(word: &str) -> bool {
    word.eq_ignore_ascii_case("sn") || word.eq_ignore_ascii_case("sw")
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|ch| ch.is_ascii_digit())
}

fn is_paren_digits(s: &str) -> bool {
    s.strip_prefix('(')
        .and_then(|rest| rest.strip_suffix(')'))
        .is_some_and(is_digits)
}

fn is_series_letter(s: &str) -> bool {
    let mut chars = s.chars();
    matches!((chars.next(), chars.next()), (Some(ch), None) if ch.is_ascii_uppercase())
}

// `4` or `4B`
fn is_series_number(s: &str) -> bool {
    if is_digits(s) {
        return true;
    }
    let Some(last) = s.chars().last() else {
        return false;
    };
    last.is_ascii_alphabetic() && is_digits(&s[..s.len() - 1])
}

/// Canonical upper-case numerals built from I, V and X (1..=39). L, C, D and M
/// are left out so two-letter club-type abbreviations such as `DC` or `CC`
/// never read as numerals.
pub fn is_roman(s: &str) -> bool {
    match roman_value(s) {
        Some(value) => to_roman(value) == s,
        None => false,
    }
}

// XXXVIII is the longest canonical form in range.
const ROMAN_MAX_LEN: usize = 7;

fn roman_value(s: &str) -> Option<u32> {
    if s.is_empty() || s.len() > ROMAN_MAX_LEN {
        return None;
    }
    let mut total = 0u32;
    let mut prev = 0u32;
    for ch in s.chars().rev() {
        let value = match ch {
            'I' => 1,
            'V' => 5,
            'X' => 10,
            _ => return None,
        };
        if value < prev {
            total = total.checked_sub(value)?;
        } else {
            total += value;
            prev = value;
        }
    }
    (1..=39).contains(&total).then_some(total)
}

fn to_roman(mut value: u32) -> String {
    const TABLE: &[(u32, &str)] = &[(10, "X"), (9, "IX"), (5, "V"), (4, "IV"), (1, "I")];
    let mut out = String::new();
    for (n, numeral) in TABLE {
        while value >= *n {
            out.push_str(numeral);
            value -= n;
        }
    }
    out
}
