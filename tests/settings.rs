use nlobk::{
    InitialConditionModel, KinematicalConstraint, LoCoupling, NloIntegration, Settings, Stepper,
};

mod parsing {
    use super::*;

    #[test]
    fn missing_sections_take_defaults() {
        let settings: Settings = serde_yaml::from_str(
            "Kernel:\n  rc_lo: parent\n  kinematical_constraint: k_minus\nEvolution:\n  stepper: euler\n",
        )
        .unwrap();

        assert_eq!(settings.kernel.rc_lo, LoCoupling::Parent);
        assert_eq!(
            settings.kernel.kinematical_constraint,
            KinematicalConstraint::KMinus
        );
        assert_eq!(settings.evolution.stepper, Stepper::Euler);
        assert_eq!(settings.evolution.step_size, 0.2);
        assert_eq!(settings.coupling.nc, 3.);
        assert_eq!(settings.grid.r_points, 200);
        assert_eq!(settings.integration.nlo_method, NloIntegration::Multiple);
        assert_eq!(settings.integration.vegas_max_iterations, 3);
        assert_eq!(settings.integration.vegas_max_relative_error, 0.3);
        assert_eq!(settings.integration.vegas_max_chisq_deviation, 0.5);
        assert_eq!(settings.initial_condition.model, InitialConditionModel::MV);
        assert!(settings.general.force_positive_n);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn unknown_prescription_is_rejected() {
        let res = serde_yaml::from_str::<Settings>("Kernel:\n  rc_lo: strongest\n");
        assert!(res.is_err());

        let res = serde_yaml::from_str::<Settings>("Integration:\n  nlo_method: plain\n");
        assert!(res.is_err());
    }

    #[test]
    fn shipped_configuration_parses() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/nlobk_config.yaml");
        let settings = Settings::from_file(path).unwrap();
        assert_eq!(settings.integration.nlo_method, NloIntegration::Vegas);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(Settings::from_file("/nonexistent/nlobk.yaml").is_err());
    }
}

mod validation {
    use super::*;

    #[test]
    fn double_log_excludes_kinematical_constraint() {
        let mut settings = Settings::default();
        settings.evolution.stepper = Stepper::Euler;
        settings.kernel.resum_dlog = true;
        settings.kernel.kinematical_constraint = KinematicalConstraint::KMinus;
        assert!(settings.validate().is_err());

        settings.kernel.kinematical_constraint = KinematicalConstraint::None;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn kinematical_constraint_needs_euler() {
        let mut settings = Settings::default();
        settings.kernel.kinematical_constraint = KinematicalConstraint::KPlus;
        settings.kernel.nlo = false;
        assert!(settings.validate().is_err());

        settings.evolution.stepper = Stepper::Euler;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn k_plus_nlo_excludes_resummation() {
        let mut settings = Settings::default();
        settings.evolution.stepper = Stepper::Euler;
        settings.kernel.kinematical_constraint = KinematicalConstraint::KPlus;
        settings.kernel.nlo = true;
        settings.kernel.resum_single_log = true;
        assert!(settings.validate().is_err());

        settings.kernel.nlo = false;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn step_size_must_be_positive() {
        let mut settings = Settings::default();
        settings.evolution.step_size = 0.;
        assert!(settings.validate().is_err());
    }
}
