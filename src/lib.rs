/*!
# Nebula360

Workflow core of a browser-based machine-learning workbench, built in Rust.

## Overview

Users upload a tabular dataset, preview it, choose an outcome variable and
predictors, configure outlier handling, train a model on a remote analysis
backend and review the results. All statistics and training happen in that
backend; this crate holds the session state, decides which step is shown,
talks to the backend over HTTP, and bridges browser sessions to the
backend's identity token.

## Architecture

### Session Layer
- **ModelSession** - Dataset, correlations, training configuration, results,
  view cursor and busy flags for one browser tab
- **View Selector** - Maps the session to the step to render
- **Step Sequencer** - `preview → selection → results`; `results` needs
  model results

### Gateway Layer
- Typed request/response shapes with a schema check at the boundary
- `AnalysisBackend` and `ModelStore` traits, implemented over reqwest
- Errors carry the backend's detail message or a per-operation fallback

### Workflow Layer
- Upload, correlations, outlier analysis (three chained calls) and training
  (encode, prepare, train, save) as sequential pipelines sharing one
  cancellation token

### Server Layer (feature `web`)
- Google sign-in and in-memory browser sessions
- Page guard for `/app` and `/auth/login`
- Model CRUD proxy that signs an HS256 token per request
- Health probe

## Modules

- **config**: Environment-driven configuration
- **dataset**: Dataset descriptor, column statistics, correlations
- **training**: Variable selection, training configuration, model results
- **steps**: View cursor, step sequencing and view selection
- **session**: Session state store
- **gateway**: Backend HTTP calls and wire schema
- **workflow**: Step pipelines over the gateway
- **login**: Browser sessions, sign-in/sign-out, page guard
- **proxy**: Auth proxy routes
- **app**: Routing and server startup

## REST API Endpoints

- `GET /api/health` - Liveness probe
- `GET /api/models?limit&offset` - List the user's models
- `POST /api/models` - Save a model
- `GET /api/models/{id}` - Fetch a model
- `DELETE /api/models/{id}` - Delete a model
- `GET|POST /auth/logout` - Sign out
*/

pub mod config;
pub mod dataset;
pub mod gateway;
pub mod session;
pub mod steps;
pub mod training;
pub mod workflow;

#[cfg(feature = "web")]
pub mod app;
#[cfg(feature = "web")]
pub mod login;
#[cfg(feature = "web")]
pub mod proxy;

pub use config::AppConfig;
pub use session::ModelSession;
pub use steps::{StepView, ViewMode};
pub use workflow::{Workflow, WorkflowError};
