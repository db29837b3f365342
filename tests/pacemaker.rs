use async_trait::async_trait;
use oschecks::cmd::{PacemakerArgs, pacemaker_host_with};
use oschecks::error::CheckError;
use oschecks::logging::LoggerArgs;
use oschecks::pacemaker::{PacemakerError, StatusSource};
use oschecks::plugin::{PluginExit, Status};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

const STATUS: &str = "\
Cluster name: openstack
Online: [ ctrl01 ctrl02 ]

 vip-keystone   (ocf::heartbeat:IPaddr2):   Started ctrl01
 vip-glance     (ocf::heartbeat:IPaddr2):   Started ctrl02
 haproxy        (systemd:haproxy):          Stopped
";

struct Canned(Result<&'static str, fn() -> PacemakerError>);

#[async_trait]
impl StatusSource for Canned {
    async fn status(&self) -> Result<String, PacemakerError> {
        match &self.0 {
            Ok(text) => Ok(text.to_string()),
            Err(make) => Err(make()),
        }
    }
}

fn args(resource: &str, script: &Path) -> PacemakerArgs {
    PacemakerArgs {
        resource: resource.into(),
        script: script.to_path_buf(),
        pcs_command: "pcs".into(),
        hostname: Some("ctrl01".into()),
        logger: LoggerArgs::default(),
    }
}

fn script(dir: &tempfile::TempDir, code: u8) -> PathBuf {
    let path = dir.path().join("check_local");
    std::fs::write(&path, format!("#!/bin/sh\nexit {code}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn report(exit: PluginExit) -> (Status, String) {
    match exit {
        PluginExit::Report(report) => (report.status(), report.text().to_string()),
        PluginExit::Passthrough(code) => panic!("unexpected passthrough {code}"),
    }
}

#[tokio::test]
async fn local_resource_delegates_exit_code() {
    let dir = tempfile::tempdir().unwrap();
    let script = script(&dir, 1);

    let exit = pacemaker_host_with(&Canned(Ok(STATUS)), &args("vip-keystone", &script))
        .await
        .unwrap();
    assert!(matches!(exit, PluginExit::Passthrough(1)), "{exit:?}");
}

#[tokio::test]
async fn remote_resource_is_ok() {
    let exit = pacemaker_host_with(
        &Canned(Ok(STATUS)),
        &args("vip-glance", Path::new("/nonexistent")),
    )
    .await
    .unwrap();
    assert_eq!(
        report(exit),
        (
            Status::Ok,
            "pacemaker resource vip-glance doesn't run on this node (but on ctrl02)".into()
        )
    );
}

#[tokio::test]
async fn stopped_and_missing_resources_are_critical() {
    let source = Canned(Ok(STATUS));
    let stopped = pacemaker_host_with(&source, &args("haproxy", Path::new("/nonexistent")))
        .await
        .unwrap();
    assert_eq!(
        report(stopped),
        (
            Status::Critical,
            "pacemaker resource haproxy is not started (Stopped)".into()
        )
    );

    let missing = pacemaker_host_with(&source, &args("vip-nova", Path::new("/nonexistent")))
        .await
        .unwrap();
    assert_eq!(
        report(missing),
        (
            Status::Critical,
            "pacemaker resource vip-nova not found".into()
        )
    );
}

#[tokio::test]
async fn missing_delegate_is_unknown() {
    let err = pacemaker_host_with(
        &Canned(Ok(STATUS)),
        &args("vip-keystone", Path::new("/nonexistent/check")),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, CheckError::Pacemaker(PacemakerError::Delegate { .. })));
    assert_eq!(err.status(), Status::Unknown);
}

#[tokio::test]
async fn status_failure_is_critical() {
    let source = Canned(Err(|| PacemakerError::StatusFailed {
        program: "pcs".into(),
        code: "1".into(),
        output: "Error: cluster is not currently running on this node".into(),
    }));
    let err = pacemaker_host_with(&source, &args("vip-keystone", Path::new("/nonexistent")))
        .await
        .unwrap_err();
    assert_eq!(err.status(), Status::Critical);
    assert_eq!(
        err.to_string(),
        "pcs status with status 1: Error: cluster is not currently running on this node"
    );
}
