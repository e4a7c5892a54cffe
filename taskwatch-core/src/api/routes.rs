macro_rules! api_path {
    ($path:literal) => {
        concat!("/api", $path)
    };
}

/// Backend route definitions for task actions, task queries and the event
/// stream.
pub mod api {
    pub mod sync {
        pub const START: &str = api_path!("/sync");
        pub const RECENT_UPDATES: &str = api_path!("/sync-recent-updates");
    }

    pub mod download {
        pub const ENTITY: &str = api_path!("/download/{entity_id}");
        pub const BATCH: &str = api_path!("/download/batch");
    }

    pub mod tasks {
        pub const ITEM: &str = api_path!("/tasks/{task_id}");
        pub const RUNNING: &str = api_path!("/tasks/running/list");
        pub const TASK_TYPE_QUERY: &str = "task_type";
    }

    pub mod events {
        pub const STREAM: &str = api_path!("/events");
    }
}
