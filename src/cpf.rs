//! Brazilian CPF (Cadastro de Pessoas Físicas) checks.

pub fn digits(cpf: &str) -> String {
    cpf.chars().filter(char::is_ascii_digit).collect()
}

/// Validates the two check digits of a CPF. Punctuation is ignored.
pub fn is_valid(cpf: &str) -> bool {
    let numbers: Vec<u32> = digits(cpf)
        .chars()
        .filter_map(|c| c.to_digit(10))
        .collect();

    if numbers.len() != 11 {
        return false;
    }
    if numbers.iter().all(|&d| d == numbers[0]) {
        return false;
    }

    check_digit(&numbers[..9]) == numbers[9] && check_digit(&numbers[..10]) == numbers[10]
}

/// Weights run from `len + 1` down to 2.
fn check_digit(numbers: &[u32]) -> u32 {
    let top = numbers.len() as u32 + 1;
    let sum: u32 = numbers
        .iter()
        .enumerate()
        .map(|(i, d)| d * (top - i as u32))
        .sum();
    match (sum * 10) % 11 {
        10 => 0,
        rest => rest,
    }
}

/// Renders a valid CPF as `000.000.000-00`.
pub fn format(cpf: &str) -> Option<String> {
    if !is_valid(cpf) {
        return None;
    }
    let d = digits(cpf);
    Some(format!("{}.{}.{}-{}", &d[..3], &d[3..6], &d[6..9], &d[9..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_good_cpf_is_valid() {
        assert!(is_valid("52998224725"));
        assert!(is_valid("529.982.247-25"));
        assert!(is_valid(" 529 982 247 25 "));
    }

    #[test]
    fn repeated_digits_are_invalid() {
        for d in 0..=9 {
            assert!(!is_valid(&d.to_string().repeat(11)));
        }
    }

    #[test]
    fn wrong_length_is_invalid() {
        assert!(!is_valid(""));
        assert!(!is_valid("529.982.247-2"));
        assert!(!is_valid("529982247251"));
        assert!(!is_valid("abc"));
    }

    #[test]
    fn wrong_check_digits_are_invalid() {
        assert!(!is_valid("52998224735"));
        assert!(!is_valid("52998224726"));
    }

    #[test]
    fn check_digit_ten_maps_to_zero() {
        // first remainder of 100.000.001 is 10
        assert!(is_valid("10000000108"));
        assert!(!is_valid("10000000118"));
        assert!(is_valid("11144477735"));
    }

    #[test]
    fn format_only_renders_valid_numbers() {
        assert_eq!(format("52998224725").as_deref(), Some("529.982.247-25"));
        assert_eq!(format("11111111111"), None);
    }

    #[test]
    fn digits_strips_punctuation() {
        assert_eq!(digits("529.982.247-25"), "52998224725");
    }
}
