//! Agent RPC wire types
//!
//! With the `proto-gen` feature the types are generated from
//! `proto/lydian/v1/agent.proto` at build time. Otherwise the equivalent
//! hand-declared messages and client below are used.

#[cfg(feature = "proto-gen")]
pub mod lydian {
    pub mod v1 {
        tonic::include_proto!("lydian.v1");
    }
}

#[cfg(not(feature = "proto-gen"))]
pub mod lydian {
    pub mod v1 {
        use prost::Message;
        use std::collections::HashMap;

        #[derive(Clone, PartialEq, Message)]
        pub struct Empty {}

        #[derive(Clone, PartialEq, Message)]
        pub struct IpList {
            #[prost(string, repeated, tag = "1")]
            pub ips: Vec<String>,
        }

        #[derive(Clone, PartialEq, Message)]
        pub struct InterfaceIpsResponse {
            #[prost(map = "string, message", tag = "1")]
            pub interfaces: HashMap<String, IpList>,
        }

        #[derive(Clone, PartialEq, Message)]
        pub struct NamespaceIpsResponse {
            #[prost(string, repeated, tag = "1")]
            pub ips: Vec<String>,
        }

        #[derive(Clone, PartialEq, Message)]
        pub struct Rule {
            #[prost(string, tag = "1")]
            pub reqid: String,
            #[prost(string, tag = "2")]
            pub ruleid: String,
            #[prost(string, tag = "3")]
            pub src: String,
            #[prost(string, tag = "4")]
            pub dst: String,
            #[prost(uint32, tag = "5")]
            pub port: u32,
            #[prost(string, tag = "6")]
            pub protocol: String,
            #[prost(bool, tag = "7")]
            pub connected: bool,
            #[prost(string, tag = "8")]
            pub payload: String,
            #[prost(double, tag = "9")]
            pub interval: f64,
            #[prost(uint32, tag = "10")]
            pub tries: u32,
        }

        #[derive(Clone, PartialEq, Message)]
        pub struct RegisterTrafficRequest {
            #[prost(message, repeated, tag = "1")]
            pub rules: Vec<Rule>,
        }

        #[derive(Clone, PartialEq, Message)]
        pub struct RuleIdsRequest {
            #[prost(string, repeated, tag = "1")]
            pub ruleids: Vec<String>,
        }

        #[derive(Clone, PartialEq, Message)]
        pub struct TrafficFilter {
            #[prost(bool, optional, tag = "1")]
            pub result: Option<bool>,
            #[prost(string, optional, tag = "2")]
            pub source: Option<String>,
            #[prost(string, optional, tag = "3")]
            pub destination: Option<String>,
            #[prost(string, optional, tag = "4")]
            pub protocol: Option<String>,
            #[prost(uint32, optional, tag = "5")]
            pub port: Option<u32>,
            #[prost(string, optional, tag = "6")]
            pub ruleid: Option<String>,
            #[prost(int64, optional, tag = "7")]
            pub since: Option<i64>,
            #[prost(int64, optional, tag = "8")]
            pub until: Option<i64>,
        }

        #[derive(Clone, PartialEq, Message)]
        pub struct TrafficQuery {
            #[prost(string, tag = "1")]
            pub reqid: String,
            #[prost(message, optional, tag = "2")]
            pub filter: Option<TrafficFilter>,
        }

        #[derive(Clone, PartialEq, Message)]
        pub struct TrafficResponse {
            #[prost(bytes = "vec", tag = "1")]
            pub records: Vec<u8>,
        }

        #[derive(Clone, PartialEq, Message)]
        pub struct LatencyQuery {
            #[prost(string, tag = "1")]
            pub reqid: String,
            #[prost(string, tag = "2")]
            pub method: String,
            #[prost(message, optional, tag = "3")]
            pub filter: Option<TrafficFilter>,
        }

        #[derive(Clone, PartialEq, Message)]
        pub struct LatencyResponse {
            #[prost(double, optional, tag = "1")]
            pub latency: Option<f64>,
        }

        #[derive(Clone, PartialEq, Message)]
        pub struct MonitorStatus {
            #[prost(bool, tag = "1")]
            pub running: bool,
        }

        #[derive(Clone, PartialEq, Message)]
        pub struct ParamRequest {
            #[prost(string, tag = "1")]
            pub name: String,
        }

        #[derive(Clone, PartialEq, Message)]
        pub struct ParamResponse {
            #[prost(string, optional, tag = "1")]
            pub value: Option<String>,
        }

        #[derive(Clone, PartialEq, Message)]
        pub struct SetParamRequest {
            #[prost(string, tag = "1")]
            pub name: String,
            #[prost(string, tag = "2")]
            pub value: String,
        }

        #[derive(Clone, PartialEq, Message)]
        pub struct PcapRequest {
            #[prost(string, tag = "1")]
            pub file_name: String,
            #[prost(string, tag = "2")]
            pub interface: String,
            #[prost(string, tag = "3")]
            pub args: String,
        }

        pub mod agent_service_client {
            use super::*;
            use tonic::codegen::*;

            #[derive(Debug, Clone)]
            pub struct AgentServiceClient<T> {
                inner: tonic::client::Grpc<T>,
            }

            impl AgentServiceClient<tonic::transport::Channel> {
                pub fn new(channel: tonic::transport::Channel) -> Self {
                    let inner = tonic::client::Grpc::new(channel);
                    Self { inner }
                }
            }

            impl<T> AgentServiceClient<T>
            where
                T: tonic::client::GrpcService<tonic::body::BoxBody>,
                T::Error: Into<StdError>,
                T::ResponseBody: Body<Data = Bytes> + Send + 'static,
                <T::ResponseBody as Body>::Error: Into<StdError> + Send,
            {
                async fn unary<Req, Resp>(
                    &mut self,
                    request: tonic::Request<Req>,
                    path: &'static str,
                ) -> Result<tonic::Response<Resp>, tonic::Status>
                where
                    Req: Message + Send + Sync + 'static,
                    Resp: Message + Default + Send + Sync + 'static,
                {
                    self.inner.ready().await.map_err(|e| {
                        tonic::Status::new(
                            tonic::Code::Unknown,
                            format!("Service was not ready: {}", e.into()),
                        )
                    })?;
                    let codec = tonic::codec::ProstCodec::<Req, Resp>::default();
                    let path = http::uri::PathAndQuery::from_static(path);
                    self.inner.unary(request, path, codec).await
                }

                pub async fn get_interface_ips_map(
                    &mut self,
                    request: impl tonic::IntoRequest<Empty>,
                ) -> Result<tonic::Response<InterfaceIpsResponse>, tonic::Status> {
                    self.unary(
                        request.into_request(),
                        "/lydian.v1.AgentService/GetInterfaceIpsMap",
                    )
                    .await
                }

                pub async fn list_namespace_ips(
                    &mut self,
                    request: impl tonic::IntoRequest<Empty>,
                ) -> Result<tonic::Response<NamespaceIpsResponse>, tonic::Status> {
                    self.unary(
                        request.into_request(),
                        "/lydian.v1.AgentService/ListNamespaceIps",
                    )
                    .await
                }

                pub async fn register_traffic(
                    &mut self,
                    request: impl tonic::IntoRequest<RegisterTrafficRequest>,
                ) -> Result<tonic::Response<Empty>, tonic::Status> {
                    self.unary(
                        request.into_request(),
                        "/lydian.v1.AgentService/RegisterTraffic",
                    )
                    .await
                }

                pub async fn start(
                    &mut self,
                    request: impl tonic::IntoRequest<RuleIdsRequest>,
                ) -> Result<tonic::Response<Empty>, tonic::Status> {
                    self.unary(request.into_request(), "/lydian.v1.AgentService/Start")
                        .await
                }

                pub async fn stop(
                    &mut self,
                    request: impl tonic::IntoRequest<RuleIdsRequest>,
                ) -> Result<tonic::Response<Empty>, tonic::Status> {
                    self.unary(request.into_request(), "/lydian.v1.AgentService/Stop")
                        .await
                }

                pub async fn traffic(
                    &mut self,
                    request: impl tonic::IntoRequest<TrafficQuery>,
                ) -> Result<tonic::Response<TrafficResponse>, tonic::Status> {
                    self.unary(request.into_request(), "/lydian.v1.AgentService/Traffic")
                        .await
                }

                pub async fn get_latency_stat(
                    &mut self,
                    request: impl tonic::IntoRequest<LatencyQuery>,
                ) -> Result<tonic::Response<LatencyResponse>, tonic::Status> {
                    self.unary(
                        request.into_request(),
                        "/lydian.v1.AgentService/GetLatencyStat",
                    )
                    .await
                }

                pub async fn monitor_start(
                    &mut self,
                    request: impl tonic::IntoRequest<Empty>,
                ) -> Result<tonic::Response<Empty>, tonic::Status> {
                    self.unary(
                        request.into_request(),
                        "/lydian.v1.AgentService/MonitorStart",
                    )
                    .await
                }

                pub async fn monitor_stop(
                    &mut self,
                    request: impl tonic::IntoRequest<Empty>,
                ) -> Result<tonic::Response<Empty>, tonic::Status> {
                    self.unary(
                        request.into_request(),
                        "/lydian.v1.AgentService/MonitorStop",
                    )
                    .await
                }

                pub async fn monitor_is_running(
                    &mut self,
                    request: impl tonic::IntoRequest<Empty>,
                ) -> Result<tonic::Response<MonitorStatus>, tonic::Status> {
                    self.unary(
                        request.into_request(),
                        "/lydian.v1.AgentService/MonitorIsRunning",
                    )
                    .await
                }

                pub async fn get_param(
                    &mut self,
                    request: impl tonic::IntoRequest<ParamRequest>,
                ) -> Result<tonic::Response<ParamResponse>, tonic::Status> {
                    self.unary(request.into_request(), "/lydian.v1.AgentService/GetParam")
                        .await
                }

                pub async fn set_param(
                    &mut self,
                    request: impl tonic::IntoRequest<SetParamRequest>,
                ) -> Result<tonic::Response<Empty>, tonic::Status> {
                    self.unary(request.into_request(), "/lydian.v1.AgentService/SetParam")
                        .await
                }

                pub async fn start_pcap(
                    &mut self,
                    request: impl tonic::IntoRequest<PcapRequest>,
                ) -> Result<tonic::Response<Empty>, tonic::Status> {
                    self.unary(request.into_request(), "/lydian.v1.AgentService/StartPcap")
                        .await
                }

                pub async fn stop_pcap(
                    &mut self,
                    request: impl tonic::IntoRequest<PcapRequest>,
                ) -> Result<tonic::Response<Empty>, tonic::Status> {
                    self.unary(request.into_request(), "/lydian.v1.AgentService/StopPcap")
                        .await
                }
            }
        }
    }
}

pub use lydian::v1::agent_service_client::AgentServiceClient;
pub use lydian::v1::*;
