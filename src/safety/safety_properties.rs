//! Tests for the deletion confirmation gate.

#[cfg(test)]
mod tests {
    use crate::config::{Config, TracingConfig};
    use crate::safety::{SafetyChecker, is_affirmative};
    use crate::test_utils::ScriptedPromptHandler;
    use proptest::prelude::*;

    fn interactive_config(json_tracing: bool) -> Config {
        let mut config = Config::for_source("bucket", "logs/");
        config.force = false;
        config.tracing_config = Some(TracingConfig {
            tracing_level: log::Level::Info,
            json_tracing,
            aws_sdk_tracing: false,
            span_events_tracing: false,
            disable_color_tracing: false,
        });
        config
    }

    #[test]
    fn force_skips_the_prompt() {
        let handler = ScriptedPromptHandler::new("no");
        let prompts = handler.prompts();
        let mut config = interactive_config(false);
        config.force = true;

        let checker = SafetyChecker::with_prompt_handler(&config, Box::new(handler));

        assert!(checker.confirm_deletion(3, "bucket").unwrap());
        assert!(prompts.lock().unwrap().is_empty());
    }

    #[test]
    fn json_logging_skips_the_prompt() {
        let handler = ScriptedPromptHandler::new("no");
        let prompts = handler.prompts();
        let checker =
            SafetyChecker::with_prompt_handler(&interactive_config(true), Box::new(handler));

        assert!(checker.confirm_deletion(3, "bucket").unwrap());
        assert!(prompts.lock().unwrap().is_empty());
    }

    #[test]
    fn non_interactive_skips_the_prompt() {
        let checker = SafetyChecker::with_prompt_handler(
            &interactive_config(false),
            Box::new(ScriptedPromptHandler::non_interactive()),
        );

        assert!(checker.confirm_deletion(3, "bucket").unwrap());
    }

    #[test]
    fn yes_confirms_and_prompt_names_count_and_bucket() {
        let handler = ScriptedPromptHandler::new("yes");
        let prompts = handler.prompts();
        let checker =
            SafetyChecker::with_prompt_handler(&interactive_config(false), Box::new(handler));

        assert!(checker.confirm_deletion(42, "my-bucket").unwrap());

        let prompts = prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("42"));
        assert!(prompts[0].contains("s3://my-bucket"));
    }

    #[test]
    fn anything_else_declines() {
        for response in ["", "n", "no", "yess", "maybe"] {
            let checker = SafetyChecker::with_prompt_handler(
                &interactive_config(false),
                Box::new(ScriptedPromptHandler::new(response)),
            );
            assert!(!checker.confirm_deletion(1, "bucket").unwrap(), "{response}");
        }
    }

    #[test]
    fn affirmative_answers() {
        assert!(is_affirmative("y"));
        assert!(is_affirmative("Y"));
        assert!(is_affirmative("yes"));
        assert!(is_affirmative(" YES "));
        assert!(!is_affirmative("ye"));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn only_y_or_yes_confirms(input in "[a-zA-Z ]{0,6}") {
            let expected = matches!(input.trim().to_lowercase().as_str(), "y" | "yes");
            let checker = SafetyChecker::with_prompt_handler(
                &interactive_config(false),
                Box::new(ScriptedPromptHandler::new(&input)),
            );

            prop_assert_eq!(checker.confirm_deletion(1, "bucket").unwrap(), expected);
        }
    }
}
