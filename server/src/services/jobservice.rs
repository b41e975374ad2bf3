use futures::{Stream, StreamExt};
use joblib::errors::JobError;
use joblib::{JobCoordinator, JobStatus};
use protobuf::agent_server::Agent;
use protobuf::{
    OutputRequest, OutputResponse, StartRequest, StartResponse, State, StatusRequest,
    StatusResponse, StopRequest, StopResponse,
};
use std::pin::Pin;
use tonic::{Request, Response, Status};

// tonic wraps this in Arc anyway internally, so we don't need Arc
pub struct AgentService {
    coordinator: JobCoordinator,
}

impl AgentService {
    pub fn new(coordinator: JobCoordinator) -> Self {
        Self { coordinator }
    }
}

fn to_state(status: JobStatus) -> State {
    match status {
        JobStatus::Running => State::Running,
        JobStatus::Complete => State::Complete,
        JobStatus::Stopped => State::Stopped,
        JobStatus::Error => State::Error,
    }
}

fn to_status(err: JobError) -> Status {
    match err {
        JobError::InvalidArgument => Status::invalid_argument(err.to_string()),
        JobError::NotFound(_) => Status::not_found(err.to_string()),
        other => {
            tracing::error!(error = %other, "request failed");
            Status::internal(other.to_string())
        }
    }
}

#[tonic::async_trait]
impl Agent for AgentService {
    type OutputStream = Pin<Box<dyn Stream<Item = Result<OutputResponse, Status>> + Send>>;

    async fn start(&self, req: Request<StartRequest>) -> Result<Response<StartResponse>, Status> {
        let StartRequest { command, args } = req.into_inner();
        tracing::info!(command = %command, args = ?args, "received start request");

        let id = self
            .coordinator
            .start_job(command, args)
            .await
            .map_err(to_status)?;
        Ok(Response::new(StartResponse { id }))
    }

    async fn status(
        &self,
        req: Request<StatusRequest>,
    ) -> Result<Response<StatusResponse>, Status> {
        let id = req.into_inner().id;
        tracing::info!(job_id = %id, "received status request");

        let execution = self
            .coordinator
            .get_job_status(&id)
            .await
            .map_err(to_status)?;
        let mut response = StatusResponse {
            id: execution.id,
            command: execution.command,
            args: execution.args,
            state: 0,
            exit_code: execution.exit_code,
        };
        response.set_state(to_state(execution.status));
        Ok(Response::new(response))
    }

    async fn stop(&self, req: Request<StopRequest>) -> Result<Response<StopResponse>, Status> {
        let id = req.into_inner().id;
        tracing::info!(job_id = %id, "received stop request");

        let id = self.coordinator.stop_job(&id).await.map_err(to_status)?;
        Ok(Response::new(StopResponse { id }))
    }

    async fn output(
        &self,
        req: Request<OutputRequest>,
    ) -> Result<Response<Self::OutputStream>, Status> {
        let id = req.into_inner().id;
        tracing::info!(job_id = %id, "received output request");

        let lines = self
            .coordinator
            .stream_output(&id)
            .await
            .map_err(to_status)?;
        let response_stream = lines.map(|line| {
            line.map(|output| OutputResponse {
                output: output.to_vec(),
            })
            .map_err(to_status)
        });
        Ok(Response::new(
            Box::pin(response_stream) as Self::OutputStream
        ))
    }
}
