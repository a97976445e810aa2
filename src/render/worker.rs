//! Render worker - runs the document service off the UI thread

use std::sync::{Arc, Mutex};

use flume::{Receiver, Sender};

use super::cache::{CacheKey, SurfaceCache};
use super::request::{RenderParams, RenderRequest, RenderResponse, RequestGate, RequestId};
use crate::document::{DocumentHandle, DocumentService};

/// Gates shared between the coordinator and its workers
#[derive(Clone, Debug, Default)]
pub struct WorkerGates {
    pub load: RequestGate,
    pub render: RequestGate,
}

pub fn render_worker(
    service: Arc<dyn DocumentService>,
    requests: Receiver<RenderRequest>,
    responses: Sender<RenderResponse>,
    cache: Arc<Mutex<SurfaceCache>>,
    gates: WorkerGates,
) {
    for request in requests {
        match request {
            RenderRequest::Load { id, reference } => {
                if gates.load.is_stale(id) {
                    let _ = responses.send(RenderResponse::Skipped(id));
                    continue;
                }
                let response = match service.load(&reference) {
                    Ok(handle) => {
                        let page_count = service.page_count(&handle);
                        RenderResponse::Loaded {
                            id,
                            handle,
                            page_count,
                        }
                    }
                    Err(error) => RenderResponse::LoadFailed { id, error },
                };
                let _ = responses.send(response);
            }

            RenderRequest::Page { id, handle, params } => {
                if gates.render.is_stale(id) {
                    log::debug!("Skipping superseded render {id:?} for page {}", params.page);
                    let _ = responses.send(RenderResponse::Skipped(id));
                    continue;
                }
                handle_page_request(service.as_ref(), id, &handle, params, &cache, &responses);
            }

            RenderRequest::Shutdown => break,
        }
    }
}

fn handle_page_request(
    service: &dyn DocumentService,
    id: RequestId,
    handle: &DocumentHandle,
    params: RenderParams,
    cache: &Arc<Mutex<SurfaceCache>>,
    responses: &Sender<RenderResponse>,
) {
    let key = CacheKey::from_params(handle, &params);

    let cached = cache
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .get(&key);
    if let Some(cached) = cached {
        let _ = responses.send(RenderResponse::Page {
            id,
            params,
            data: cached,
        });
        return;
    }

    match service.rasterize(handle, params.page, params.scale) {
        Ok(page) => {
            let data = cache
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .insert(key, page);
            let _ = responses.send(RenderResponse::Page { id, params, data });
        }
        Err(error) => {
            let _ = responses.send(RenderResponse::Error { id, params, error });
        }
    }
}
