//! The `meta` envelope opening every log.

use crate::messages::{Ci, Git, Meta, Product, PROTOCOL_VERSION};

/// Describe this implementation and the machine it runs on.
pub fn create_meta() -> Meta {
    Meta {
        protocol_version: PROTOCOL_VERSION.to_string(),
        implementation: Product::new(env!("CARGO_PKG_NAME"), Some(env!("CARGO_PKG_VERSION"))),
        runtime: Product::new(
            "rust",
            Some(env!("CARGO_PKG_RUST_VERSION")).filter(|v| !v.is_empty()),
        ),
        os: Product::new(std::env::consts::OS, None),
        cpu: Product::new(std::env::consts::ARCH, None),
        ci: detect_ci(|name| std::env::var(name).ok()),
    }
}

/// Recognize a handful of CI services from their environment variables.
pub fn detect_ci<F>(lookup: F) -> Option<Ci>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |name: &str| lookup(name).filter(|value| !value.is_empty());

    if var("GITHUB_ACTIONS").is_some() {
        let url = match (var("GITHUB_SERVER_URL"), var("GITHUB_REPOSITORY"), var("GITHUB_RUN_ID")) {
            (Some(server), Some(repository), Some(run)) => {
                Some(format!("{server}/{repository}/actions/runs/{run}"))
            }
            _ => None,
        };
        let git = match (var("GITHUB_SERVER_URL"), var("GITHUB_REPOSITORY"), var("GITHUB_SHA")) {
            (Some(server), Some(repository), Some(revision)) => Some(Git {
                remote: format!("{server}/{repository}.git"),
                revision,
                branch: var("GITHUB_HEAD_REF").or_else(|| var("GITHUB_REF_NAME")),
                tag: None,
            }),
            _ => None,
        };
        return Some(Ci {
            name: "GitHub Actions".to_string(),
            url,
            build_number: var("GITHUB_RUN_ID"),
            git,
        });
    }

    let known: [(&str, &str, &str, &str); 6] = [
        ("GITLAB_CI", "GitLab", "CI_PIPELINE_URL", "CI_PIPELINE_IID"),
        ("CIRCLECI", "CircleCI", "CIRCLE_BUILD_URL", "CIRCLE_BUILD_NUM"),
        ("JENKINS_URL", "Jenkins", "BUILD_URL", "BUILD_NUMBER"),
        ("TRAVIS", "Travis CI", "TRAVIS_BUILD_WEB_URL", "TRAVIS_JOB_NUMBER"),
        ("BUILDKITE", "Buildkite", "BUILDKITE_BUILD_URL", "BUILDKITE_BUILD_NUMBER"),
        ("TF_BUILD", "Azure Pipelines", "BUILD_BUILDURI", "BUILD_BUILDNUMBER"),
    ];

    known
        .iter()
        .find(|(marker, ..)| var(marker).is_some())
        .map(|(_, name, url, build_number)| Ci {
            name: (*name).to_string(),
            url: var(url),
            build_number: var(build_number),
            git: None,
        })
}
