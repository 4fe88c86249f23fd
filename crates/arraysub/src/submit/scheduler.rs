use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::Output;

use anyhow::Context;
use bstr::ByteSlice;
use serde::{Deserialize, Serialize};
use tokio::process::Command;

use crate::common::error::ArraySubError;
use crate::common::manager::slurm::{
    format_array_spec, parse_node_records, parse_sbatch_output, NodeRecord,
};
use crate::submit::chunk::Chunk;

/// How array indices map to manifest tasks.
#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexMode {
    /// Every chunk is submitted as `1-<size>` and the chunk start is passed as an offset.
    /// Keeps array indices below the `MaxArraySize` limit of the cluster.
    #[default]
    Offset,
    /// Array indices are the task indices themselves, the offset is always zero.
    Global,
}

/// Parameters shared by all array submissions of a single run.
#[derive(Debug, Clone)]
pub struct RequestTemplate {
    pub template: PathBuf,
    pub manifest: PathBuf,
    pub partition: Option<String>,
    pub index_mode: IndexMode,
    pub offset_variable: String,
    pub job_name: Option<String>,
    pub extra_args: Vec<String>,
}

impl RequestTemplate {
    /// Checks that the offset variable and the manifest path fit into the `--export` list.
    ///
    /// `sbatch` separates the list by commas and has no escaping, so neither value may contain one.
    pub fn validate(&self) -> crate::Result<()> {
        if self.offset_variable.is_empty() || self.offset_variable.contains([',', '=']) {
            return Err(ArraySubError::ConfigError(format!(
                "Invalid offset variable name `{}`",
                self.offset_variable
            )));
        }
        let manifest = self.manifest.display().to_string();
        if manifest.contains(',') {
            return Err(ArraySubError::ConfigError(format!(
                "Manifest path {manifest} contains a comma, which cannot be passed through `sbatch --export`"
            )));
        }
        if let Some(arg) = self
            .extra_args
            .iter()
            .find(|arg| arg.starts_with("--export"))
        {
            log::warn!(
                "Additional sbatch argument `{arg}` overrides the exported variables {} and ARRAYSUB_MANIFEST, \
                 tasks may not find their manifest lines",
                self.offset_variable
            );
        }
        Ok(())
    }

    pub fn create_request(&self, chunk: &Chunk) -> ArrayRequest {
        let (array_spec, offset) = match self.index_mode {
            IndexMode::Offset => (
                format_array_spec(1, chunk.size(), chunk.concurrency),
                chunk.start - 1,
            ),
            IndexMode::Global => (
                format_array_spec(chunk.start, chunk.end, chunk.concurrency),
                0,
            ),
        };
        ArrayRequest {
            chunk: *chunk,
            array_spec,
            offset,
            template: self.clone(),
        }
    }
}

/// A single array submission, `actual_task_index = array_index + offset`.
#[derive(Debug, Clone)]
pub struct ArrayRequest {
    pub chunk: Chunk,
    pub array_spec: String,
    pub offset: u64,
    template: RequestTemplate,
}

impl ArrayRequest {
    /// Arguments of the corresponding `sbatch` invocation.
    pub fn sbatch_args(&self) -> Vec<String> {
        let template = &self.template;
        let mut args = vec![format!("--array={}", self.array_spec)];
        if let Some(partition) = &template.partition {
            args.push(format!("--partition={partition}"));
        }
        if let Some(name) = &template.job_name {
            args.push(format!("--job-name={name}"));
        }
        args.push(format!(
            "--export=ALL,{}={},ARRAYSUB_MANIFEST={}",
            template.offset_variable,
            self.offset,
            template.manifest.display()
        ));
        args.extend(template.extra_args.iter().cloned());
        args.push(template.template.display().to_string());
        args
    }

    pub fn format_command(&self) -> String {
        let mut command = vec!["sbatch".to_string()];
        command.extend(self.sbatch_args());
        command.join(" ")
    }
}

/// Response of the scheduler to a single array submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerResponse {
    Accepted { job_id: String, message: String },
    /// The array specification itself was refused, a smaller range might pass.
    RangeRejected { message: String },
    OtherFailure { message: String },
}

/// Handler that can submit array jobs to a scheduler and inspect its resources.
pub trait ArrayScheduler {
    /// Submits a single array job. The call only waits until the scheduler accepts or
    /// refuses the job, not until the job finishes.
    fn submit_array(
        &mut self,
        request: &ArrayRequest,
    ) -> Pin<Box<dyn Future<Output = SchedulerResponse>>>;

    /// Returns the current state of all compute nodes.
    fn query_nodes(&self) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<NodeRecord>>>>>;
}

pub struct SlurmScheduler {
    workdir: PathBuf,
}

impl SlurmScheduler {
    pub fn new(workdir: PathBuf) -> Self {
        Self { workdir }
    }

    /// Checks that the Slurm client tools can be found.
    pub fn check_available() -> anyhow::Result<PathBuf> {
        which::which("sbatch").context("Cannot find `sbatch`, is Slurm available on this node?")
    }
}

impl ArrayScheduler for SlurmScheduler {
    fn submit_array(
        &mut self,
        request: &ArrayRequest,
    ) -> Pin<Box<dyn Future<Output = SchedulerResponse>>> {
        let mut arguments = vec!["sbatch".to_string()];
        arguments.extend(request.sbatch_args());
        let workdir = self.workdir.clone();

        Box::pin(async move {
            log::debug!("Running Slurm command `{}`", arguments.join(" "));
            let mut command = create_command(&arguments, &workdir);
            match command.output().await {
                Ok(output) => {
                    let response = parse_sbatch_output(
                        output.status.success(),
                        &output.stdout.to_str_lossy(),
                        &output.stderr.to_str_lossy(),
                    );
                    log::debug!("Sbatch response: {response:?}");
                    response
                }
                Err(error) => SchedulerResponse::OtherFailure {
                    message: format!("sbatch start failed: {error}"),
                },
            }
        })
    }

    fn query_nodes(&self) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<NodeRecord>>>>> {
        let workdir = self.workdir.clone();

        Box::pin(async move {
            let arguments = ["scontrol", "show", "node", "--oneliner"].map(String::from);
            log::debug!("Running Slurm command `{}`", arguments.join(" "));
            let output = create_command(&arguments, &workdir)
                .output()
                .await
                .context("scontrol start failed")?;
            let output = check_command_output(output).context("scontrol execution failed")?;
            let output = output
                .stdout
                .to_str()
                .map_err(|err| anyhow::anyhow!("Invalid UTF-8 in scontrol output: {:?}", err))?;
            Ok(parse_node_records(output))
        })
    }
}

fn create_command(arguments: &[String], workdir: &Path) -> Command {
    let mut command = Command::new(&arguments[0]);
    command.args(&arguments[1..]);
    command.current_dir(workdir);
    command
}

fn check_command_output(output: Output) -> anyhow::Result<Output> {
    let status = output.status;
    if !status.success() {
        return Err(anyhow::anyhow!(
            "Exit code: {}\nStderr: {}\nStdout: {}",
            status.code().unwrap_or(-1),
            output.stderr.to_str_lossy().trim(),
            output.stdout.to_str_lossy().trim()
        ));
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::IndexMode;
    use crate::common::error::ArraySubError;
    use crate::submit::chunk::Chunk;
    use std::path::PathBuf;
    use crate::tests::utils::request_template;

    #[test]
    fn test_offset_request() {
        let template = request_template(IndexMode::Offset);
        let request = template.create_request(&Chunk::new(1001, 2000, 20));
        assert_eq!(request.array_spec, "1-1000%20");
        assert_eq!(request.offset, 1000);
    }

    #[test]
    fn test_global_request() {
        let template = request_template(IndexMode::Global);
        let request = template.create_request(&Chunk::new(1001, 2000, 20));
        assert_eq!(request.array_spec, "1001-2000%20");
        assert_eq!(request.offset, 0);
    }

    #[test]
    fn test_sbatch_args() {
        let mut template = request_template(IndexMode::Offset);
        template.partition = Some("compute".to_string());
        template.job_name = Some("bioc".to_string());
        template.extra_args = vec!["--account=proj42".to_string()];
        let request = template.create_request(&Chunk::new(2001, 2500, 8));
        insta::assert_snapshot!(request.format_command(), @"sbatch --array=1-500%8 --partition=compute --job-name=bioc --export=ALL,ARRAYSUB_OFFSET=2000,ARRAYSUB_MANIFEST=/data/manifest.txt --account=proj42 /data/job.sh");
    }

    #[test]
    fn test_validate_rejects_comma_in_manifest() {
        let mut template = request_template(IndexMode::Offset);
        assert!(template.validate().is_ok());
        template.manifest = PathBuf::from("/data/run1,run2/manifest.txt");
        assert!(matches!(
            template.validate(),
            Err(ArraySubError::ConfigError(_))
        ));
    }

    #[test]
    fn test_validate_rejects_bad_offset_variable() {
        let mut template = request_template(IndexMode::Offset);
        template.offset_variable = "OFFSET,OTHER".to_string();
        assert!(template.validate().is_err());
        template.offset_variable = String::new();
        assert!(template.validate().is_err());
    }

    #[test]
    fn test_validate_allows_user_export() {
        let mut template = request_template(IndexMode::Offset);
        template.extra_args = vec!["--export=NONE".to_string()];
        assert!(template.validate().is_ok());
    }
}
