//! Deterministic stand-in generator used when a real client cannot be built.

use async_trait::async_trait;

use crate::context::stage_from_context;
use crate::domain::StageKind;

use super::{GenerationError, Generator};

/// Returns a canned, policy-clean draft for the stage named in the context.
#[derive(Debug, Clone)]
pub struct StubGenerator {
    id: String,
}

impl StubGenerator {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    pub fn draft_for(&self, stage: StageKind) -> String {
        let body = match stage {
            StageKind::Dockerfile => DOCKERFILE,
            StageKind::Compose => COMPOSE,
            StageKind::Kubernetes => KUBERNETES,
            StageKind::Cicd => WORKFLOW,
            StageKind::Observability => CHART,
        };
        format!("# drafted by {}\n{}", self.id, body.trim_start())
    }
}

#[async_trait]
impl Generator for StubGenerator {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_stub(&self) -> bool {
        true
    }

    async fn generate(&self, context: &str) -> Result<String, GenerationError> {
        let stage = stage_from_context(context).ok_or_else(|| {
            GenerationError::Unavailable("stub generator needs a STAGE header".to_string())
        })?;
        Ok(self.draft_for(stage))
    }
}

const DOCKERFILE: &str = r#"
FROM node:20.11-alpine AS build
WORKDIR /app
COPY package*.json ./
RUN npm ci --omit=dev
COPY . .

FROM node:20.11-alpine
WORKDIR /app
COPY --from=build /app /app
USER node
EXPOSE 3000
HEALTHCHECK --interval=30s --timeout=3s CMD wget -qO- http://localhost:3000/health || exit 1
CMD ["node", "index.js"]
"#;

const COMPOSE: &str = r#"
services:
  app:
    build: .
    ports:
      - "3000:3000"
    environment:
      - NODE_ENV=production
    depends_on:
      - mongo
  mongo:
    image: mongo:7.0.5
    volumes:
      - mongo-data:/data/db
volumes:
  mongo-data:
"#;

const KUBERNETES: &str = r#"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: app
  namespace: app
spec:
  replicas: 2
  selector:
    matchLabels:
      app: app
  template:
    metadata:
      labels:
        app: app
    spec:
      containers:
        - name: app
          image: registry.example.com/app:1.0.0
          ports:
            - containerPort: 3000
          resources:
            requests:
              cpu: 100m
              memory: 128Mi
            limits:
              cpu: 500m
              memory: 256Mi
          readinessProbe:
            httpGet:
              path: /health
              port: 3000
---
apiVersion: v1
kind: Service
metadata:
  name: app
  namespace: app
spec:
  selector:
    app: app
  ports:
    - port: 80
      targetPort: 3000
"#;

const WORKFLOW: &str = r#"
name: ci
on:
  push:
    branches: [main]
  pull_request:
jobs:
  build:
    runs-on: ubuntu-latest
    steps:
      - uses: actions/checkout@v4
      - uses: actions/setup-node@v4
        with:
          node-version: 20
      - run: npm ci
      - run: npm test
"#;

const CHART: &str = r#"
apiVersion: v2
name: app-monitoring
description: Prometheus and Loki stack for app
type: application
version: 0.1.0
appVersion: "1.0.0"
dependencies:
  - name: prometheus
    version: 25.8.0
    repository: https://prometheus-community.github.io/helm-charts
  - name: loki
    version: 5.41.4
    repository: https://grafana.github.io/helm-charts
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{render_generation_context, ProjectContext};

    #[tokio::test]
    async fn test_stub_drafts_for_stage_in_context() {
        let stub = StubGenerator::new("stub-a");
        let ctx = render_generation_context(StageKind::Cicd, &ProjectContext::default(), &[]);
        let draft = stub.generate(&ctx).await.unwrap();
        assert!(draft.starts_with("# drafted by stub-a"));
        assert!(draft.contains("jobs:"));
    }

    #[tokio::test]
    async fn test_stub_without_stage_header_fails() {
        let stub = StubGenerator::new("stub-a");
        let err = stub.generate("no header").await.unwrap_err();
        assert!(matches!(err, GenerationError::Unavailable(_)));
    }
}
