use geoask_dsl::Value;
use geoask_engine::backend::FilterValue;
use geoask_engine::cache::prompt_key;
use geoask_engine::executor::coerce_filter_value;
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig { cases: 256, .. ProptestConfig::default() })]

    #[test]
    fn prompt_key_ignores_indentation_and_blank_lines(
        lines in prop::collection::vec("[a-z_()',]{1,24}", 1..8),
        indent in 0usize..8,
        blanks in 0usize..3,
    ) {
        let plain = lines.join("\n");
        let padding = " ".repeat(indent);
        let blank = "\n".repeat(blanks);
        let noisy = lines
            .iter()
            .map(|l| format!("{padding}{l}  "))
            .collect::<Vec<_>>()
            .join(&format!("\n{blank}"));
        prop_assert_eq!(prompt_key(&plain), prompt_key(&noisy));
    }

    #[test]
    fn non_boolean_text_passes_through_integer_filters(s in "[a-zA-Z ]{0,12}") {
        let lowered = s.to_lowercase();
        prop_assume!(!matches!(lowered.as_str(), "true" | "false" | "yes" | "no"));
        prop_assert_eq!(
            coerce_filter_value(&Value::Text(s.clone()), true),
            FilterValue::Text(s)
        );
    }

    #[test]
    fn numbers_are_never_coerced(n in any::<i64>(), x in -1.0e9f64..1.0e9) {
        prop_assert_eq!(coerce_filter_value(&Value::Integer(n), true), FilterValue::Integer(n));
        prop_assert_eq!(coerce_filter_value(&Value::Float(x), false), FilterValue::Float(x));
    }
}
