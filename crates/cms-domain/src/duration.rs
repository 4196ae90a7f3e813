// [crates/cms-domain/src/duration.rs]
/*!
 * Gramática de duración compacta: un entero seguido de un sufijo de
 * unidad `s`/`m`/`h`/`d`. Cualquier otro sufijo (o ausencia de uno) es
 * tratado como duración cero en lugar de fallar la ignición del sistema.
 */

use chrono::Duration;

/// Interpreta cadenas como `"15m"`, `"30d"`, `"1h"`. Sufijo desconocido -> 0.
pub fn parse_ttl(raw: &str) -> Duration {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Duration::zero();
    }

    let (digits, suffix) = trimmed.split_at(trimmed.len() - 1);
    let Ok(amount) = digits.parse::<i64>() else {
        return Duration::zero();
    };

    match suffix {
        "s" => Duration::seconds(amount),
        "m" => Duration::minutes(amount),
        "h" => Duration::hours(amount),
        "d" => Duration::days(amount),
        _ => Duration::zero(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_each_known_unit() {
        assert_eq!(parse_ttl("15m"), Duration::minutes(15));
        assert_eq!(parse_ttl("1h"), Duration::hours(1));
        assert_eq!(parse_ttl("30d"), Duration::days(30));
        assert_eq!(parse_ttl("45s"), Duration::seconds(45));
    }

    #[test]
    fn unknown_suffix_is_zero() {
        assert_eq!(parse_ttl("15w"), Duration::zero());
        assert_eq!(parse_ttl(""), Duration::zero());
        assert_eq!(parse_ttl("abc"), Duration::zero());
    }
}
