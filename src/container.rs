//! Docker container lifecycle for one historical interpreter build.
//!
//! One container per date, named deterministically from the date, is reused
//! across the three JIT configurations within a runner invocation and removed
//! when the session closes. The session handle is the only owner of that
//! container: orchestration code acquires it, runs whatever it needs, and
//! closes it on every exit path.

use std::{path::Path, time::Duration};

use anyhow::{bail, Context};
use bollard::{
    container::{
        Config, CreateContainerOptions, LogOutput, RemoveContainerOptions,
        RestartContainerOptions,
    },
    errors::Error as DockerError,
    exec::{CreateExecOptions, StartExecResults},
    image::CreateImageOptions,
    service::HostConfig,
    Docker,
};
use futures::{StreamExt, TryStreamExt};

use crate::store::DateKey;

/// Registry image holding the historical interpreter builds, tagged by commit
/// SHA.
pub const IMAGE: &str = "ghcr.io/ruby/ruby-master-nightly";

/// Mount point of the benchmark working tree inside the container.
pub const MOUNT_PATH: &str = "/bench";

const CONTAINER_PREFIX: &str = "ruby-history-bench";

/// Hard wall-clock bound on a single in-container command.
const EXEC_TIMEOUT: Duration = Duration::from_secs(600);

/// Exit code reported for a command that was killed on timeout, matching the
/// coreutils `timeout(1)` convention.
pub const TIMEOUT_EXIT_CODE: i64 = 124;

/// OS-level build dependencies installed once per container lifetime.
const BUILD_DEPS: &[&str] = &[
    "build-essential",
    "git",
    "libffi-dev",
    "libyaml-dev",
    "zlib1g-dev",
];

/// Captured outcome of one in-container command.
#[derive(Debug)]
pub struct ExecOutput {
    /// Process exit code; [`TIMEOUT_EXIT_CODE`] when killed on timeout.
    pub exit_code: i64,
    /// Combined stdout and stderr.
    pub stdout: String,
}

impl ExecOutput {
    /// Whether the command exited cleanly.
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Scoped handle on the one container backing a runner invocation.
pub struct ContainerSession {
    docker: Docker,
    name: String,
}

impl ContainerSession {
    /// Creates or reuses the container for the given date, pinned to the
    /// interpreter build image for `sha`, with the working tree bind-mounted.
    /// On fresh creation the fixed build-dependency package list is installed.
    ///
    /// A container whose provisioning fails after creation is removed before
    /// the error propagates, so the next invocation re-provisions from
    /// scratch instead of reusing a half-set-up container.
    ///
    /// # Errors
    ///
    /// Fails if the image cannot be pulled, the container cannot be created or
    /// started, or dependency installation fails.
    pub async fn acquire(
        docker: &Docker,
        date: DateKey,
        sha: &str,
        workdir: &Path,
    ) -> anyhow::Result<Self> {
        let name = format!("{CONTAINER_PREFIX}-{date}");
        let image = format!("{IMAGE}:{sha}");

        let exists = match docker.inspect_container(&name, None).await {
            Ok(_) => true,
            Err(DockerError::DockerResponseServerError {
                status_code: 404, ..
            }) => false,
            Err(err) => {
                return Err(err).context(format!("could not inspect container {name}"));
            }
        };

        let session = Self {
            docker: docker.clone(),
            name: name.clone(),
        };

        if exists {
            log::info!("[{name}] reusing existing container");
        } else {
            log::info!("[{name}] pulling image {image}...");
            docker
                .create_image(
                    Some(CreateImageOptions {
                        from_image: image.clone(),
                        ..Default::default()
                    }),
                    None,
                    None,
                )
                .try_for_each(|info| async move {
                    if let Some(status) = info.status {
                        log::debug!("{status}");
                    }
                    Ok(())
                })
                .await
                .context(format!("could not pull image {image}"))?;

            log::info!("[{name}] creating container...");
            docker
                .create_container(
                    Some(CreateContainerOptions {
                        name: name.clone(),
                        ..Default::default()
                    }),
                    Config {
                        image: Some(image.clone()),
                        cmd: Some(vec!["sleep".to_string(), "infinity".to_string()]),
                        working_dir: Some(MOUNT_PATH.to_string()),
                        host_config: Some(HostConfig {
                            binds: Some(vec![format!("{}:{MOUNT_PATH}", workdir.display())]),
                            ..Default::default()
                        }),
                        ..Default::default()
                    },
                )
                .await
                .context(format!("could not create container {name}"))?;
        }

        if let Err(err) = session.provision(!exists).await {
            log::warn!(
                "[{name}] provisioning failed, removing the container so the next run starts clean..."
            );
            session.close().await;
            return Err(err);
        }

        Ok(session)
    }

    /// Starts the container and, for a freshly created one, installs the
    /// build-dependency package list.
    async fn provision(&self, fresh: bool) -> anyhow::Result<()> {
        if let Err(err) = self
            .docker
            .start_container::<String>(&self.name, None)
            .await
        {
            match err {
                DockerError::DockerResponseServerError {
                    status_code: 304, ..
                } => {}
                err => {
                    return Err(err).context(format!("could not start container {}", self.name));
                }
            }
        }

        if fresh {
            log::info!("[{}] installing build dependencies...", self.name);
            let install = format!(
                "apt-get update -qq && DEBIAN_FRONTEND=noninteractive apt-get install -y -qq {}",
                BUILD_DEPS.join(" ")
            );
            let out = self.exec(&["bash", "-c", &install]).await?;
            if !out.success() {
                bail!(
                    "could not install build dependencies in container {} (exit {}):\n{}",
                    self.name,
                    out.exit_code,
                    out.stdout
                );
            }
        }
        Ok(())
    }

    /// Runs a command in the container's working tree, capturing combined
    /// output, bounded by a hard 10-minute timeout. A command that exceeds the
    /// bound is killed by forcibly restarting the container and reported with
    /// [`TIMEOUT_EXIT_CODE`].
    ///
    /// # Errors
    ///
    /// Fails only on Docker-level errors, never on a nonzero command exit.
    pub async fn exec(&self, cmd: &[&str]) -> anyhow::Result<ExecOutput> {
        log::debug!("[{}] exec: {}", self.name, cmd.join(" "));
        let exec = self
            .docker
            .create_exec(
                &self.name,
                CreateExecOptions::<String> {
                    cmd: Some(cmd.iter().map(ToString::to_string).collect()),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    working_dir: Some(MOUNT_PATH.to_string()),
                    ..Default::default()
                },
            )
            .await
            .context("could not create exec")?;

        let collect = async {
            match self
                .docker
                .start_exec(&exec.id, None)
                .await
                .context("could not start exec")?
            {
                StartExecResults::Attached { output, .. } => {
                    let stdout = output
                        .fold(String::new(), |acc, r| async move {
                            match r {
                                Ok(LogOutput::StdOut { message })
                                | Ok(LogOutput::StdErr { message }) => {
                                    acc + &String::from_utf8_lossy(&message)
                                }
                                Ok(_) => acc,
                                Err(err) => {
                                    log::warn!("could not read exec output: {err}, continuing...");
                                    acc
                                }
                            }
                        })
                        .await;
                    Ok::<String, anyhow::Error>(stdout)
                }
                StartExecResults::Detached => Ok(String::new()),
            }
        };

        match tokio::time::timeout(EXEC_TIMEOUT, collect).await {
            Ok(stdout) => {
                let stdout = stdout?;
                let inspect = self
                    .docker
                    .inspect_exec(&exec.id)
                    .await
                    .context("could not inspect exec")?;
                Ok(ExecOutput {
                    exit_code: inspect.exit_code.unwrap_or(-1),
                    stdout,
                })
            }
            Err(_) => {
                log::warn!(
                    "[{}] command exceeded {}s, killing it by restarting the container...",
                    self.name,
                    EXEC_TIMEOUT.as_secs()
                );
                self.docker
                    .restart_container(&self.name, Some(RestartContainerOptions { t: 0 }))
                    .await
                    .context(format!("could not restart container {}", self.name))?;
                Ok(ExecOutput {
                    exit_code: TIMEOUT_EXIT_CODE,
                    stdout: String::new(),
                })
            }
        }
    }

    /// Discards files created in the working tree by a run, keeping the
    /// results directory. Best-effort: failures are logged, not propagated.
    pub async fn reset_workdir(&self) {
        let commands: [&[&str]; 2] = [
            &["git", "checkout", "--", "."],
            &["git", "clean", "-fd", "--exclude", "results"],
        ];
        for cmd in commands {
            match self.exec(cmd).await {
                Ok(out) if out.success() => {}
                Ok(out) => log::warn!(
                    "[{}] working tree reset step '{}' exited with status {}, continuing...",
                    self.name,
                    cmd.join(" "),
                    out.exit_code
                ),
                Err(err) => log::warn!(
                    "[{}] could not reset working tree: {err}, continuing...",
                    self.name
                ),
            }
        }
    }

    /// Forcibly removes the container. Best-effort: failures are logged, not
    /// propagated.
    pub async fn close(self) {
        match self
            .docker
            .remove_container(
                &self.name,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await
        {
            Ok(()) => log::debug!("[{}] removed container", self.name),
            Err(err) => log::warn!("[{}] could not remove container: {err}", self.name),
        }
    }
}
