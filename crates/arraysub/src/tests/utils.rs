use std::cell::RefCell;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::rc::Rc;

use crate::common::manager::slurm::NodeRecord;
use crate::submit::scheduler::{
    ArrayRequest, ArrayScheduler, IndexMode, RequestTemplate, SchedulerResponse,
};

type ResponseFn = dyn Fn(&ArrayRequest) -> SchedulerResponse;

#[derive(Default)]
struct MockState {
    requests: Vec<ArrayRequest>,
    nodes: Option<Vec<NodeRecord>>,
}

/// Scheduler that answers submissions with a closure and remembers all requests.
pub struct MockScheduler {
    respond: Box<ResponseFn>,
    state: Rc<RefCell<MockState>>,
}

impl MockScheduler {
    pub fn new<F: Fn(&ArrayRequest) -> SchedulerResponse + 'static>(respond: F) -> Self {
        Self {
            respond: Box::new(respond),
            state: Default::default(),
        }
    }

    /// Accepts everything, job ids are assigned sequentially starting at 1000.
    pub fn always_accept() -> Self {
        let counter = RefCell::new(1000);
        Self::new(move |_| {
            let mut counter = counter.borrow_mut();
            let id = *counter;
            *counter += 1;
            SchedulerResponse::Accepted {
                job_id: id.to_string(),
                message: format!("Submitted batch job {id}"),
            }
        })
    }

    pub fn always_reject_range() -> Self {
        Self::new(|_| SchedulerResponse::RangeRejected {
            message: "sbatch: error: Batch job submission failed: Invalid job array specification"
                .to_string(),
        })
    }

    pub fn with_nodes(self, nodes: Vec<NodeRecord>) -> Self {
        self.state.borrow_mut().nodes = Some(nodes);
        self
    }

    pub fn with_node_query_failure(self) -> Self {
        self.state.borrow_mut().nodes = None;
        self
    }

    pub fn requests(&self) -> Vec<ArrayRequest> {
        self.state.borrow().requests.clone()
    }
}

impl ArrayScheduler for MockScheduler {
    fn submit_array(
        &mut self,
        request: &ArrayRequest,
    ) -> Pin<Box<dyn Future<Output = SchedulerResponse>>> {
        self.state.borrow_mut().requests.push(request.clone());
        let response = (self.respond)(request);
        Box::pin(async move { response })
    }

    fn query_nodes(&self) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<NodeRecord>>>>> {
        let nodes = self.state.borrow().nodes.clone();
        Box::pin(async move {
            nodes.ok_or_else(|| anyhow::anyhow!("scontrol: error: Unable to contact slurm controller"))
        })
    }
}

pub fn request_template(index_mode: IndexMode) -> RequestTemplate {
    RequestTemplate {
        template: PathBuf::from("/data/job.sh"),
        manifest: PathBuf::from("/data/manifest.txt"),
        partition: None,
        index_mode,
        offset_variable: "ARRAYSUB_OFFSET".to_string(),
        job_name: None,
        extra_args: vec![],
    }
}

pub fn write_manifest(dir: &Path, content: &str) -> PathBuf {
    let path = dir.join("manifest.txt");
    std::fs::write(&path, content).unwrap();
    path
}

/// Writes a manifest with `count` task lines, interleaved with a few ignored lines.
pub fn write_manifest_with_tasks(dir: &Path, count: usize) -> PathBuf {
    let mut content = String::from("# generated\n");
    for index in 0..count {
        content.push_str(&format!("inputs/doc-{index:05}.xml\n"));
        if index % 100 == 0 {
            content.push('\n');
        }
    }
    write_manifest(dir, &content)
}

pub fn write_template(dir: &Path, content: &str) -> PathBuf {
    let path = dir.join("job.sh");
    std::fs::write(&path, content).unwrap();
    path
}
