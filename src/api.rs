use crate::{
    html,
    http_response::handle_service_result,
    network_probe::NetworkProbe,
    services::{
        connectivity::ConnectivityStateMachine,
        credentials::NetworkCredentials,
        next_stage::NextStage,
    },
};
use actix_web::{HttpResponse, Responder, http::header::ContentType, web};
use log::{debug, info, warn};
use serde::Deserialize;
use serde_valid::Validate;
use std::sync::Arc;

#[derive(Deserialize, Validate)]
pub struct ConnectForm {
    #[validate(min_length = 1)]
    #[validate(max_length = 32)]
    ssid: String,
    #[serde(default)]
    password: String,
}

pub struct Api<Probe, Launcher> {
    pub machine: Arc<ConnectivityStateMachine<Probe, Launcher>>,
}

impl<Probe, Launcher> Clone for Api<Probe, Launcher> {
    fn clone(&self) -> Self {
        Self {
            machine: Arc::clone(&self.machine),
        }
    }
}

impl<Probe, Launcher> Api<Probe, Launcher>
where
    Probe: NetworkProbe + Send + Sync,
    Launcher: NextStage + Sync,
{
    pub fn new(machine: Arc<ConnectivityStateMachine<Probe, Launcher>>) -> Self {
        Api { machine }
    }

    pub async fn index(api: web::Data<Self>) -> impl Responder {
        debug!("index() called");

        let networks = api.machine.network_list().await;

        HttpResponse::Ok()
            .content_type(ContentType::html())
            .body(html::setup_page(&networks))
    }

    pub async fn connect(form: web::Form<ConnectForm>, api: web::Data<Self>) -> impl Responder {
        let form = form.into_inner();
        debug!("connect() called for {:?}", form.ssid);

        if let Err(e) = form.validate() {
            warn!("rejected network form: {e}");
            return HttpResponse::BadRequest().body(format!("invalid network: {e}"));
        }

        let credentials = match NetworkCredentials::new(&form.ssid, &form.password) {
            Ok(credentials) => credentials,
            Err(e) => {
                warn!("rejected network form: {e:#}");
                return HttpResponse::BadRequest().body(format!("invalid network: {e:#}"));
            }
        };

        let page = html::connecting_page(credentials.ssid());

        match api.machine.submit_credentials(credentials) {
            Ok(()) => {
                info!("network accepted, answering before the access point goes down");
                HttpResponse::Ok()
                    .content_type(ContentType::html())
                    .body(page)
            }
            Err(e) => {
                warn!("rejected network form: {e}");
                HttpResponse::Conflict().body(e.to_string())
            }
        }
    }

    pub async fn networks(api: web::Data<Self>) -> impl Responder {
        debug!("networks() called");
        handle_service_result(Ok(api.machine.network_list().await), "networks")
    }

    pub async fn status(api: web::Data<Self>) -> impl Responder {
        debug!("status() called");
        handle_service_result(api.machine.status_report().await, "status")
    }

    pub async fn version() -> impl Responder {
        HttpResponse::Ok().body(env!("CARGO_PKG_VERSION"))
    }
}
