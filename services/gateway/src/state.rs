use depth_mirror::QueryService;

#[derive(Clone)]
pub struct AppState {
    pub query: QueryService,
}

impl AppState {
    pub fn new(query: QueryService) -> Self {
        Self { query }
    }
}
