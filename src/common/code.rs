// src/common/code.rs

use validator::ValidationError;

pub const MAX_CODE_LENGTH: usize = 20;

/// Forma canônica do código: sem espaços nas pontas e em maiúsculas.
pub fn normalize_code(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// Dois códigos colidem se forem iguais ignorando caixa e espaços nas pontas.
pub fn codes_collide(a: &str, b: &str) -> bool {
    normalize_code(a) == normalize_code(b)
}

// Validação customizada usada pelos payloads de catálogo
pub fn validate_code(code: &str) -> Result<(), ValidationError> {
    let trimmed = code.trim();

    if trimmed.is_empty() {
        let mut err = ValidationError::new("required");
        err.message = Some("El código es obligatorio.".into());
        return Err(err);
    }

    if trimmed.chars().count() > MAX_CODE_LENGTH {
        let mut err = ValidationError::new("length");
        err.add_param("max".into(), &MAX_CODE_LENGTH);
        err.message = Some(format!("El código no puede superar {} caracteres.", MAX_CODE_LENGTH).into());
        return Err(err);
    }

    if !trimmed
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        let mut err = ValidationError::new("format");
        err.message = Some("El código solo admite letras, números, '-', '_' y '.'.".into());
        return Err(err);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("BOD", " bod ")]
    #[case("Bod", "BOD")]
    #[case("a-1", "A-1\t")]
    fn codes_differing_in_case_or_whitespace_collide(#[case] existing: &str, #[case] attempt: &str) {
        assert!(codes_collide(existing, attempt));
    }

    #[test]
    fn different_codes_do_not_collide() {
        assert!(!codes_collide("BOD", "BOD2"));
    }

    #[rstest]
    #[case("   ", "required")]
    #[case("ABCDEFGHIJKLMNOPQRSTU", "length")]
    #[case("AB CD", "format")]
    fn rejects_bad_codes(#[case] code: &str, #[case] expected: &str) {
        assert_eq!(validate_code(code).unwrap_err().code, expected);
    }

    #[test]
    fn accepts_regular_codes() {
        assert!(validate_code(" mkt-01 ").is_ok());
        assert_eq!(normalize_code(" mkt-01 "), "MKT-01");
    }
}
