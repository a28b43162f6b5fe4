//! Maps (verb, identifier presence) onto index/show/store/update/destroy for one resource.

use crate::clock::{Clock, SystemClock};
use crate::config::settings::{DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT};
use crate::config::{KeyType, RelationGraph, ResolvedResource};
use crate::error::AppError;
use crate::locator::{Identifier, ResourceLocator};
use crate::model::Model;
use crate::response::{success_many, success_one, PageMeta};
use crate::sql::Driver;
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Transport-neutral request as the controller sees it.
#[derive(Clone, Debug)]
pub struct ResourceRequest {
    /// Request path, e.g. "/stocks/1".
    pub endpoint: String,
    pub method: Method,
    pub query: HashMap<String, String>,
    pub headers: HeaderMap,
    pub body: Option<Value>,
}

impl ResourceRequest {
    pub fn new(method: Method, endpoint: impl Into<String>) -> Self {
        ResourceRequest {
            endpoint: endpoint.into(),
            method,
            query: HashMap::new(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn with_query(mut self, key: &str, value: &str) -> Self {
        self.query.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    fn param<T: std::str::FromStr>(&self, key: &str) -> Option<T> {
        self.query.get(key).and_then(|v| v.trim().parse().ok())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ResourceResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl ResourceResponse {
    fn ok(status: StatusCode, body: Value) -> Self {
        ResourceResponse { status, body }
    }

    /// Outcome for a request no operation handles: 400 when an identifier is missing, 405 otherwise.
    pub fn unhandled(method: &Method, has_identifier: bool) -> Self {
        let missing_identifier =
            matches!(*method, Method::PUT | Method::PATCH | Method::DELETE) && !has_identifier;
        if missing_identifier {
            return AppError::Validation(format!("{} requires an identifier", method)).into();
        }
        ResourceResponse {
            status: StatusCode::METHOD_NOT_ALLOWED,
            body: AppError::BadRequest(format!("method {} not allowed", method)).to_body(),
        }
    }
}

impl From<AppError> for ResourceResponse {
    fn from(err: AppError) -> Self {
        ResourceResponse {
            status: err.status(),
            body: err.to_body(),
        }
    }
}

impl IntoResponse for ResourceResponse {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    Index,
    Show,
    Store,
    Update,
    Destroy,
}

/// Dispatch table. `None` for every combination no operation handles.
pub fn operation_for(method: &Method, has_identifier: bool) -> Option<Operation> {
    match (method, has_identifier) {
        (&Method::GET, false) => Some(Operation::Index),
        (&Method::GET, true) => Some(Operation::Show),
        (&Method::POST, _) => Some(Operation::Store),
        (&Method::PUT | &Method::PATCH, true) => Some(Operation::Update),
        (&Method::DELETE, true) => Some(Operation::Destroy),
        _ => None,
    }
}

pub struct ResourceController {
    graph: Arc<RelationGraph>,
    resource: String,
    page_limit: u64,
    clock: Arc<dyn Clock>,
}

impl ResourceController {
    pub fn new(graph: Arc<RelationGraph>, resource: &str) -> Result<Self, AppError> {
        if graph.resource(resource).is_none() {
            return Err(AppError::NotFound(format!("resource '{}'", resource)));
        }
        Ok(ResourceController {
            graph,
            resource: resource.to_string(),
            page_limit: DEFAULT_PAGE_LIMIT,
            clock: Arc::new(SystemClock),
        })
    }

    /// One controller per declared resource, in declaration order.
    pub fn for_graph(graph: &Arc<RelationGraph>, page_limit: u64) -> Vec<Self> {
        graph
            .resources
            .keys()
            .filter_map(|name| Self::new(Arc::clone(graph), name).ok())
            .map(|c| c.with_page_limit(page_limit))
            .collect()
    }

    pub fn with_page_limit(mut self, limit: u64) -> Self {
        self.page_limit = limit.clamp(1, MAX_PAGE_LIMIT);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    fn resolved(&self) -> Result<&ResolvedResource, AppError> {
        self.graph
            .resource(&self.resource)
            .ok_or_else(|| AppError::NotFound(format!("resource '{}'", self.resource)))
    }

    pub fn endpoint(&self) -> String {
        self.graph
            .resource(&self.resource)
            .map(ResolvedResource::endpoint)
            .unwrap_or_else(|| format!("/{}", self.resource))
    }

    /// Endpoint itself, or exactly one segment below it.
    pub fn can_process_request(&self, req: &ResourceRequest) -> bool {
        let path = req.endpoint.trim_end_matches('/');
        let endpoint = self.endpoint();
        match path.strip_prefix(endpoint.as_str()) {
            Some("") => true,
            Some(rest) => rest
                .strip_prefix('/')
                .map(|seg| !seg.is_empty() && !seg.contains('/'))
                .unwrap_or(false),
            None => false,
        }
    }

    /// Relations named by `?include=a,b`, all declared ones with `?with_relations=true`,
    /// or those switched on one by one with `?with_<name>=true` (declaration order).
    fn requested_relations(&self, req: &ResourceRequest) -> Vec<String> {
        if let Some(list) = req.query.get("include") {
            return list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        let declared = self
            .graph
            .resource(&self.resource)
            .map(|r| r.relation_names())
            .unwrap_or_default();
        if req.param::<bool>("with_relations").unwrap_or(false) {
            return declared;
        }
        declared
            .into_iter()
            .filter(|name| req.param::<bool>(&format!("with_{}", name)).unwrap_or(false))
            .collect()
    }

    /// Run the request. `None` means no operation handles it; the caller decides the outcome.
    pub async fn process(&self, req: &ResourceRequest, driver: &mut dyn Driver) -> Option<ResourceResponse> {
        let locator = ResourceLocator::parse(&req.endpoint);
        let identifier = locator.identifier().cloned();
        let Some(op) = operation_for(&req.method, identifier.is_some()) else {
            tracing::warn!(
                method = %req.method,
                endpoint = %req.endpoint,
                has_identifier = identifier.is_some(),
                "no operation for request"
            );
            return None;
        };
        if locator.resource() != self.resource {
            return Some(AppError::NotFound(req.endpoint.clone()).into());
        }
        tracing::debug!(resource = %self.resource, operation = ?op, "dispatch");

        if op == Operation::Index || op == Operation::Show {
            return Some(self.dispatch(op, req, identifier.as_ref(), driver).await.unwrap_or_else(Into::into));
        }

        if let Err(e) = driver.begin().await {
            return Some(AppError::from(e).into());
        }
        let outcome = self.dispatch(op, req, identifier.as_ref(), driver).await;
        let response = match outcome {
            Ok(resp) => match driver.commit().await {
                Ok(()) => resp,
                Err(e) => AppError::from(e).into(),
            },
            Err(err) => {
                if let Err(e) = driver.rollback().await {
                    tracing::warn!(error = %e, "rollback failed");
                }
                err.into()
            }
        };
        Some(response)
    }

    async fn dispatch(
        &self,
        op: Operation,
        req: &ResourceRequest,
        id: Option<&Identifier>,
        driver: &mut dyn Driver,
    ) -> Result<ResourceResponse, AppError> {
        match (op, id) {
            (Operation::Index, _) => self.index(req, driver).await,
            (Operation::Store, _) => self.store(req, driver).await,
            (Operation::Show, Some(id)) => self.show(req, id, driver).await,
            (Operation::Update, Some(id)) => self.update(req, id, driver).await,
            (Operation::Destroy, Some(id)) => self.destroy(req, id, driver).await,
            (_, None) => Err(AppError::Validation("identifier required".into())),
        }
    }

    async fn index(&self, req: &ResourceRequest, driver: &mut dyn Driver) -> Result<ResourceResponse, AppError> {
        let limit = req
            .param::<u64>("limit")
            .unwrap_or(self.page_limit)
            .clamp(1, MAX_PAGE_LIMIT);
        let page = req.param::<u64>("page").unwrap_or(1).max(1);
        let offset = (page - 1) * limit;
        let relations = self.requested_relations(req);

        let mut rows = Model::list(&self.graph, &self.resource, driver, Some(limit), Some(offset)).await?;
        if !relations.is_empty() {
            for row in rows.iter_mut() {
                row.load(driver, &relations).await?;
            }
        }
        let total = Model::count(&self.graph, &self.resource, driver).await?;

        let data: Vec<Value> = rows.iter().map(Model::to_json).collect();
        let meta = PageMeta::new(data.len() as u64, total, page, limit, offset);
        Ok(ResourceResponse::ok(StatusCode::OK, success_many(data, meta)))
    }

    async fn find(&self, id: &Identifier, driver: &mut dyn Driver) -> Result<Model, AppError> {
        let shape_matches = matches!(
            (self.resolved()?.key_type, id),
            (KeyType::Integer, Identifier::Integer(_)) | (KeyType::Uuid, Identifier::Uuid(_))
        );
        if !shape_matches {
            return Err(AppError::NotFound(format!("{} {}", self.resource, id)));
        }
        let mut model = Model::new(Arc::clone(&self.graph), &self.resource)?;
        if !model.get(driver, id).await? {
            return Err(AppError::NotFound(format!("{} {}", self.resource, id)));
        }
        Ok(model)
    }

    async fn show(&self, req: &ResourceRequest, id: &Identifier, driver: &mut dyn Driver) -> Result<ResourceResponse, AppError> {
        let mut model = self.find(id, driver).await?;
        model.load(driver, &self.requested_relations(req)).await?;
        Ok(ResourceResponse::ok(StatusCode::OK, success_one(model.to_json())))
    }

    async fn store(&self, req: &ResourceRequest, driver: &mut dyn Driver) -> Result<ResourceResponse, AppError> {
        let body = req
            .body
            .as_ref()
            .ok_or_else(|| AppError::BadRequest("request body required".into()))?;
        let mut model = Model::new(Arc::clone(&self.graph), &self.resource)?;
        model.fill(body)?;
        model.insert(driver, self.clock.as_ref()).await?;
        Ok(ResourceResponse::ok(StatusCode::CREATED, success_one(model.to_json())))
    }

    async fn update(&self, req: &ResourceRequest, id: &Identifier, driver: &mut dyn Driver) -> Result<ResourceResponse, AppError> {
        let mut model = self.find(id, driver).await?;
        if let Some(body) = &req.body {
            model.fill(body)?;
            // The row named in the path stays the target whatever key the body carries.
            model.set_key(id.to_value());
        }
        model.update(driver, self.clock.as_ref()).await?;
        Ok(ResourceResponse::ok(StatusCode::OK, success_one(model.to_json())))
    }

    async fn destroy(&self, req: &ResourceRequest, id: &Identifier, driver: &mut dyn Driver) -> Result<ResourceResponse, AppError> {
        let mut model = self.find(id, driver).await?;
        model.load(driver, &self.requested_relations(req)).await?;
        model.delete(driver).await?;
        Ok(ResourceResponse::ok(StatusCode::OK, success_one(model.to_json())))
    }
}

/// Controller whose endpoint can process `req`.
pub fn route<'c>(controllers: &'c [ResourceController], req: &ResourceRequest) -> Option<&'c ResourceController> {
    controllers.iter().find(|c| c.can_process_request(req))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{load_from_str, resolve};

    fn controller() -> ResourceController {
        let config = load_from_str(r#"{"resources": {"stocks": {}}}"#).unwrap();
        ResourceController::new(Arc::new(resolve(&config).unwrap()), "stocks").unwrap()
    }

    #[test]
    fn dispatch_table() {
        assert_eq!(operation_for(&Method::GET, false), Some(Operation::Index));
        assert_eq!(operation_for(&Method::GET, true), Some(Operation::Show));
        assert_eq!(operation_for(&Method::POST, false), Some(Operation::Store));
        assert_eq!(operation_for(&Method::POST, true), Some(Operation::Store));
        assert_eq!(operation_for(&Method::PATCH, true), Some(Operation::Update));
        assert_eq!(operation_for(&Method::PUT, true), Some(Operation::Update));
        assert_eq!(operation_for(&Method::DELETE, true), Some(Operation::Destroy));
        assert_eq!(operation_for(&Method::PUT, false), None);
        assert_eq!(operation_for(&Method::DELETE, false), None);
        assert_eq!(operation_for(&Method::HEAD, false), None);
    }

    #[test]
    fn endpoint_matching() {
        let c = controller();
        assert_eq!(c.endpoint(), "/stocks");
        assert!(c.can_process_request(&ResourceRequest::new(Method::GET, "/stocks")));
        assert!(c.can_process_request(&ResourceRequest::new(Method::GET, "/stocks/")));
        assert!(c.can_process_request(&ResourceRequest::new(Method::GET, "/stocks/1")));
        assert!(!c.can_process_request(&ResourceRequest::new(Method::GET, "/stocks/1/product")));
        assert!(!c.can_process_request(&ResourceRequest::new(Method::GET, "/stocksx")));
        assert!(!c.can_process_request(&ResourceRequest::new(Method::GET, "/sales")));
    }

    #[test]
    fn unhandled_statuses() {
        assert_eq!(ResourceResponse::unhandled(&Method::DELETE, false).status, StatusCode::BAD_REQUEST);
        assert_eq!(ResourceResponse::unhandled(&Method::PUT, false).status, StatusCode::BAD_REQUEST);
        assert_eq!(ResourceResponse::unhandled(&Method::HEAD, false).status, StatusCode::METHOD_NOT_ALLOWED);
    }

    #[test]
    fn per_relation_flags_follow_declaration_order() {
        let config = load_from_str(
            r#"{"resources": {
                "stocks": {"relations": {
                    "product": {"type": "belongs_to", "resource": "products"},
                    "batch": {"type": "belongs_to", "resource": "batches"}
                }},
                "products": {},
                "batches": {}
            }}"#,
        )
        .unwrap();
        let c = ResourceController::new(Arc::new(resolve(&config).unwrap()), "stocks").unwrap();
        let req = ResourceRequest::new(Method::GET, "/stocks/1")
            .with_query("with_batch", "true")
            .with_query("with_product", "true");
        assert_eq!(c.requested_relations(&req), vec!["product", "batch"]);

        let req = ResourceRequest::new(Method::GET, "/stocks/1").with_query("with_product", "false");
        assert!(c.requested_relations(&req).is_empty());
    }

    #[test]
    fn include_keeps_caller_order() {
        let c = controller();
        let req = ResourceRequest::new(Method::GET, "/stocks").with_query("include", "b, a,,c");
        assert_eq!(c.requested_relations(&req), vec!["b", "a", "c"]);
    }
}
