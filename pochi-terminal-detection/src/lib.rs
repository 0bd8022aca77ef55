//! Terminal creation options and the heuristic that decides whether the
//! editor host spawned a terminal by itself (for example when the panel is
//! revealed) rather than in response to a user or extension request.

mod options;
mod profiles;

pub use options::{TerminalLocation, TerminalOptions};
pub use profiles::{TerminalPlatform, TerminalProfile, TerminalProfileSettings};

/// Best-effort check for terminals the host created by default.
///
/// The host exposes no direct signal, so the creation options are compared
/// against what the configured default profile would produce.
pub fn is_terminal_likely_created_by_default(
    options: &TerminalOptions,
    settings: &TerminalProfileSettings,
    platform: TerminalPlatform,
) -> bool {
    if options.pty || options.location.is_some() || options.message.is_some() {
        return false;
    }

    let Some(default_profile) = settings.default_profile(platform) else {
        return options.name.is_none()
            && options.shell_path.is_none()
            && options.shell_args.is_none()
            && options.cwd.is_none();
    };

    if let Some(entry) = settings.profile(platform, default_profile) {
        let Some(profile) = entry else {
            return false;
        };
        let expected_name = profile.override_name.then_some(default_profile);
        return options.name.as_deref() == expected_name && options.cwd.is_none();
    }

    if settings
        .contributed_profiles()
        .iter()
        .any(|title| title == default_profile)
    {
        return options.name.as_deref() == Some(default_profile);
    }

    options.name.is_none() && options.cwd.is_none()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn settings_with_profile(profile: Option<TerminalProfile>) -> TerminalProfileSettings {
        let mut profiles = HashMap::new();
        profiles.insert("zsh".to_string(), profile);
        TerminalProfileSettings::default()
            .with_default_profile(TerminalPlatform::Linux, "zsh")
            .with_profiles(TerminalPlatform::Linux, profiles)
    }

    #[test]
    fn bare_terminal_without_default_profile_is_default() {
        let settings = TerminalProfileSettings::default();
        assert!(is_terminal_likely_created_by_default(
            &TerminalOptions::default(),
            &settings,
            TerminalPlatform::Linux,
        ));

        let named = TerminalOptions {
            name: Some("build".into()),
            ..TerminalOptions::default()
        };
        assert!(!is_terminal_likely_created_by_default(
            &named,
            &settings,
            TerminalPlatform::Linux,
        ));
    }

    #[test]
    fn explicit_options_are_never_default() {
        let settings = TerminalProfileSettings::default();
        let cases = [
            TerminalOptions {
                pty: true,
                ..TerminalOptions::default()
            },
            TerminalOptions {
                location: Some(TerminalLocation::Panel),
                ..TerminalOptions::default()
            },
            TerminalOptions {
                message: Some("hello".into()),
                ..TerminalOptions::default()
            },
        ];
        for options in cases {
            assert!(!is_terminal_likely_created_by_default(
                &options,
                &settings,
                TerminalPlatform::Linux,
            ));
        }
    }

    #[test]
    fn configured_profile_name_depends_on_override() {
        let plain = settings_with_profile(Some(TerminalProfile::default()));
        assert!(is_terminal_likely_created_by_default(
            &TerminalOptions::default(),
            &plain,
            TerminalPlatform::Linux,
        ));

        let overriding = settings_with_profile(Some(TerminalProfile {
            override_name: true,
            ..TerminalProfile::default()
        }));
        let named = TerminalOptions {
            name: Some("zsh".into()),
            ..TerminalOptions::default()
        };
        assert!(is_terminal_likely_created_by_default(
            &named,
            &overriding,
            TerminalPlatform::Linux,
        ));
        assert!(!is_terminal_likely_created_by_default(
            &TerminalOptions::default(),
            &overriding,
            TerminalPlatform::Linux,
        ));

        let with_cwd = TerminalOptions {
            cwd: Some(PathBuf::from("/work")),
            ..TerminalOptions::default()
        };
        assert!(!is_terminal_likely_created_by_default(
            &with_cwd,
            &plain,
            TerminalPlatform::Linux,
        ));
    }

    #[test]
    fn disabled_profile_entry_is_not_default() {
        let settings = settings_with_profile(None);
        assert!(!is_terminal_likely_created_by_default(
            &TerminalOptions::default(),
            &settings,
            TerminalPlatform::Linux,
        ));
    }

    #[test]
    fn contributed_profile_requires_matching_name() {
        let settings = TerminalProfileSettings::default()
            .with_default_profile(TerminalPlatform::Osx, "Dev Shell")
            .with_contributed_profiles(vec!["Dev Shell".into()]);
        let named = TerminalOptions {
            name: Some("Dev Shell".into()),
            ..TerminalOptions::default()
        };
        assert!(is_terminal_likely_created_by_default(
            &named,
            &settings,
            TerminalPlatform::Osx,
        ));
        assert!(!is_terminal_likely_created_by_default(
            &TerminalOptions::default(),
            &settings,
            TerminalPlatform::Osx,
        ));
    }

    #[test]
    fn unknown_default_profile_falls_back_to_unnamed_check() {
        let settings = TerminalProfileSettings::default()
            .with_default_profile(TerminalPlatform::Windows, "pwsh");
        assert!(is_terminal_likely_created_by_default(
            &TerminalOptions::default(),
            &settings,
            TerminalPlatform::Windows,
        ));
        // Settings for another platform do not apply.
        assert!(!is_terminal_likely_created_by_default(
            &TerminalOptions {
                shell_path: Some("/bin/sh".into()),
                ..TerminalOptions::default()
            },
            &settings,
            TerminalPlatform::Linux,
        ));
    }
}
