//! The only thing pod-bouncer needs from the cluster: deleting a pod by namespace and name.
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::{
	api::{Api, DeleteParams},
	Client,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClusterError {
	#[error("not found: {0}")]
	NotFound(String),
	#[error("forbidden: {0}")]
	Forbidden(String),
	#[error("api error {code}: {message}")]
	Api { code: u16, message: String },
	#[error("could not reach the cluster api")]
	Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl From<kube::Error> for ClusterError {
	fn from(err: kube::Error) -> Self {
		match err {
			kube::Error::Api(response) => match response.code {
				404 => Self::NotFound(response.message),
				403 => Self::Forbidden(response.message),
				code => Self::Api { code, message: response.message },
			},
			err => Self::Transport(Box::new(err)),
		}
	}
}

/// Deletes pods. Implementations issue exactly one request per call and don't wait for the pod to go away.
#[async_trait]
pub trait PodDeleter: Send + Sync {
	async fn delete_pod(&self, namespace: &str, name: &str) -> Result<(), ClusterError>;
}

/// [PodDeleter] talking to the kubernetes api server
#[derive(Clone)]
pub struct KubePodDeleter {
	client: Client,
	params: DeleteParams,
}

impl KubePodDeleter {
	pub fn new(client: Client, grace_period_seconds: Option<u32>) -> Self {
		let params = DeleteParams { grace_period_seconds, ..Default::default() };

		Self { client, params }
	}
}

#[async_trait]
impl PodDeleter for KubePodDeleter {
	async fn delete_pod(&self, namespace: &str, name: &str) -> Result<(), ClusterError> {
		let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);

		pods.delete(name, &self.params).await?;

		Ok(())
	}
}
