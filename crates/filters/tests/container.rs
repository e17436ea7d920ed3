#![forbid(unsafe_code)]

use kpipe_core::{Document, Error};
use kpipe_filters::ContainerFilter;
use kpipe_kio::Filter;

#[rustfmt::skip]
const SANDBOX_ARGS: [&str; 14] = [
    "run", "--rm",
    "-i", "-a", "STDIN", "-a", "STDOUT", "-a", "STDERR",
    "--network", "none",
    "--user", "nobody",
    "--security-opt=no-new-privileges",
];

fn function_config() -> Document {
    Document::parse("apiversion: apps/v1\nkind: Deployment\nmetadata:\n  name: foo\n").unwrap()
}

/// Every test that compares environment snapshots sets the same variable first,
/// so the set of names cannot change between two snapshots.
fn set_test_env() {
    std::env::set_var("KYAML_TEST", "FOO");
}

/// UTF-8 variable names of the current process, in enumeration order.
fn host_env_names() -> Vec<String> {
    std::env::vars_os().filter_map(|(k, _)| k.into_string().ok()).collect()
}

fn expected_args(filter: &ContainerFilter, env_names: &[String], tail: &[&str]) -> Vec<String> {
    let mut expected: Vec<String> = SANDBOX_ARGS.iter().map(|s| s.to_string()).collect();
    for name in env_names {
        expected.push("-e".to_string());
        expected.push(name.clone());
    }
    expected.push(filter.image().to_string());
    expected.extend(tail.iter().map(|s| s.to_string()));
    expected
}

#[test]
fn invocation_uses_the_sandbox_profile_and_forwards_environment() {
    set_test_env();
    let f = ContainerFilter::new("example.com:version")
        .with_config(function_config())
        .with_runtime("docker");
    let inv = f.invocation();

    let names = host_env_names();
    assert!(names.iter().any(|n| n == "KYAML_TEST"));
    assert_eq!(inv.program, "docker");
    assert_eq!(inv.args, expected_args(&f, &names, &[]));
    let snapshot: Vec<&str> = inv.env.iter().map(|(k, _)| k.as_str()).collect();
    assert_eq!(snapshot, names);

    let cmd = inv.command();
    let forwarded = cmd
        .get_envs()
        .find(|(k, _)| k.to_str() == Some("KYAML_TEST"))
        .and_then(|(_, v)| v)
        .and_then(|v| v.to_str());
    assert_eq!(forwarded, Some("FOO"));
    assert_eq!(cmd.get_program(), "docker");
}

#[test]
fn override_args_follow_the_image() {
    set_test_env();
    let f = ContainerFilter::new("gcr.io/example/fn:v1").with_args(["sed", "s/a/b/g"]);
    let inv = f.invocation();
    assert_eq!(inv.args, expected_args(&f, &host_env_names(), &["sed", "s/a/b/g"]));
    assert_eq!(inv.args.last().map(String::as_str), Some("s/a/b/g"));
}

#[test]
fn function_config_documents_build_filters() {
    let cfg = Document::parse("apiVersion: gcr.io/example/set-ns:v1\nkind: SetNamespace\nspec:\n  namespace: prod\n").unwrap();
    let f = ContainerFilter::from_function_config(cfg.clone()).unwrap();
    assert_eq!(f.image(), "gcr.io/example/set-ns:v1");
    assert_eq!(f.config(), Some(&cfg));

    let plain = Document::parse("apiVersion: apps/v1\nkind: Deployment\n").unwrap();
    assert!(ContainerFilter::from_function_config(plain).is_none());
}

#[test]
fn missing_runtime_is_a_spawn_error() {
    let mut f = ContainerFilter::new("example.com:version")
        .with_config(function_config())
        .with_runtime("kpipe-test-no-such-runtime");
    let input = vec![Document::parse("apiVersion: v1\nkind: Service\nmetadata:\n  name: service-foo\n").unwrap()];
    let err = f.filter(input).unwrap_err();
    match err.downcast_ref::<Error>() {
        Some(Error::Spawn { program, .. }) => {
            assert_eq!(program, "kpipe-test-no-such-runtime example.com:version")
        }
        other => panic!("expected spawn error, got {:?}", other),
    }
}
