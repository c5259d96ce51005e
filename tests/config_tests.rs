//! Run options: defaults, TOML loading and validation.

use std::io::Write;
use std::time::Duration;
use use_delegation_lab::config::DemoOptions;
use use_delegation_lab::sdk::{UNITS_PER_COIN, UseMethod};

mod defaults {
    use super::*;

    #[test]
    fn reference_flow_defaults() {
        let o = DemoOptions::default();
        assert_eq!(o.funding_amount, UNITS_PER_COIN);
        assert_eq!(o.delegate_amount, UNITS_PER_COIN / 2);
        assert_eq!(o.initial_uses, 2);
        assert_eq!(o.use_method, UseMethod::Burn);
        assert_eq!(o.max_supply, 1);
        assert_eq!(o.delegated_uses, 2);
        assert_eq!(o.metadata.name, "name");
        assert_eq!(o.metadata.symbol, "symbol");
        assert!(o.validate().is_ok());
    }

    #[test]
    fn capability_config_follows_options() {
        let o = DemoOptions {
            initial_uses: 5,
            use_method: UseMethod::Multiple,
            ..DemoOptions::default()
        };
        let config = o.capability_config().unwrap();
        assert_eq!(config.uses.total, 5);
        assert_eq!(config.uses.remaining, 5);
        assert_eq!(config.uses.use_method, UseMethod::Multiple);
    }

    #[test]
    fn confirm_settings_become_durations() {
        let c = DemoOptions::default().confirm_options();
        assert_eq!(c.poll_interval, Duration::from_millis(200));
        assert_eq!(c.timeout, Duration::from_secs(30));
    }
}

mod loading {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let o = DemoOptions::from_toml_str(
            r#"
            initial_uses = 4
            delegated_uses = 3
            use_method = "multiple"

            [metadata]
            name = "pass"
            symbol = "PASS"
            uri = "https://example.com/pass.json"
            seller_fee_basis_points = 0

            [confirm]
            timeout_secs = 5
            "#,
        )
        .unwrap();
        assert_eq!(o.initial_uses, 4);
        assert_eq!(o.delegated_uses, 3);
        assert_eq!(o.use_method, UseMethod::Multiple);
        assert_eq!(o.metadata.symbol, "PASS");
        assert_eq!(o.confirm.timeout_secs, 5);
        assert_eq!(o.confirm.poll_interval_ms, 200);
        assert_eq!(o.funding_amount, UNITS_PER_COIN);
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "delegated_uses = 1").unwrap();
        let o = DemoOptions::load(file.path()).unwrap();
        assert_eq!(o.delegated_uses, 1);
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = DemoOptions::load(std::path::Path::new("/nonexistent/options.toml")).unwrap_err();
        assert!(err.to_string().contains("cannot read"));
    }

    #[test]
    fn bad_toml_is_an_error() {
        assert!(DemoOptions::from_toml_str("initial_uses = \"two\"").is_err());
        assert!(DemoOptions::from_toml_str("use_method = \"scrap\"").is_err());
    }
}

mod validation {
    use super::*;

    #[test]
    fn delegated_uses_bounded_by_initial() {
        let o = DemoOptions {
            delegated_uses: 3,
            ..DemoOptions::default()
        };
        assert!(o.validate().unwrap_err().to_string().contains("delegated_uses"));
    }

    #[test]
    fn zero_delegated_uses_is_allowed() {
        let o = DemoOptions {
            delegated_uses: 0,
            ..DemoOptions::default()
        };
        assert!(o.validate().is_ok());
    }

    #[test]
    fn zero_initial_uses_fails() {
        let o = DemoOptions {
            initial_uses: 0,
            delegated_uses: 0,
            ..DemoOptions::default()
        };
        assert!(o.validate().is_err());
    }

    #[test]
    fn delegate_amount_must_leave_owner_funds() {
        let o = DemoOptions {
            delegate_amount: UNITS_PER_COIN,
            ..DemoOptions::default()
        };
        assert!(o.validate().is_err());
    }

    #[test]
    fn zero_max_supply_fails() {
        let o = DemoOptions {
            max_supply: 0,
            ..DemoOptions::default()
        };
        assert!(o.validate().unwrap_err().to_string().contains("max_supply"));
    }

    #[test]
    fn single_burn_use_fails() {
        let o = DemoOptions {
            initial_uses: 1,
            delegated_uses: 1,
            ..DemoOptions::default()
        };
        assert!(o.validate().unwrap_err().to_string().contains("burn"));
    }

    #[test]
    fn single_use_without_burn_is_allowed() {
        for use_method in [UseMethod::Single, UseMethod::Multiple] {
            let o = DemoOptions {
                initial_uses: 1,
                delegated_uses: 1,
                use_method,
                ..DemoOptions::default()
            };
            assert!(o.validate().is_ok(), "{use_method:?}");
        }
    }
}
