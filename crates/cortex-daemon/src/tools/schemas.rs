//! Tool Schemas
//!
//! JSON Schema descriptions for `GET /mcp/tools/list`. Kept in one place
//! so the registry and the schema list cannot drift apart silently.

use serde_json::{Value, json};

/// The full tool list with input schemas.
pub fn tool_list() -> Value {
    json!([
        {
            "name": "orient_session",
            "description": "Orient a new session: index status, reindex signals, skeleton, tech stack, focused initiative, and recent work for a repository.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "project_path": {"type": "string", "description": "Absolute path to the project repository"}
                },
                "required": ["project_path"]
            }
        },
        {
            "name": "search_cortex",
            "description": "Hybrid search over code and memory: BM25 + vector retrieval, RRF fusion, reranking, type/recency/initiative boosts, and staleness annotations.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "query": {"type": "string"},
                    "repository": {"type": "string"},
                    "branch": {"type": "string"},
                    "initiative": {"type": "string", "description": "Initiative id or name to filter by"},
                    "types": {"type": "array", "items": {"type": "string", "enum": [
                        "code", "skeleton", "file_metadata", "dependency", "data_contract",
                        "entry_point", "note", "insight", "session_summary", "tech_stack", "initiative"
                    ]}},
                    "preset": {"type": "string", "enum": ["code", "memory", "context", "all"]},
                    "min_score": {"type": "number", "minimum": 0.0, "maximum": 1.0},
                    "include_completed": {"type": "boolean", "default": true}
                },
                "required": ["query"]
            }
        },
        {
            "name": "recall_recent_work",
            "description": "Day-grouped timeline of recent notes and session summaries for a repository.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "repository": {"type": "string"},
                    "days": {"type": "integer", "default": 7, "minimum": 1},
                    "limit": {"type": "integer", "default": 20, "minimum": 1},
                    "include_code": {"type": "boolean", "default": false}
                },
                "required": ["repository"]
            }
        },
        {
            "name": "get_skeleton",
            "description": "Fetch the current repository skeleton (rendered directory tree).",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "repository": {"type": "string"},
                    "branch": {"type": "string"}
                },
                "required": ["repository"]
            }
        },
        {
            "name": "manage_initiative",
            "description": "Create, list, focus, complete, or summarize multi-session initiatives.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "action": {"type": "string", "enum": ["create", "list", "focus", "complete", "summarize"]},
                    "repository": {"type": "string"},
                    "name": {"type": "string", "description": "Initiative name (create)"},
                    "goal": {"type": "string"},
                    "initiative": {"type": "string", "description": "Initiative id or name (focus/complete/summarize)"},
                    "summary": {"type": "string", "description": "Completion summary (complete)"},
                    "status": {"type": "string", "enum": ["all", "active", "completed"], "default": "all"},
                    "auto_focus": {"type": "boolean", "default": true}
                },
                "required": ["action", "repository"]
            }
        },
        {
            "name": "save_memory",
            "description": "Save understanding to memory: kind='note' for decisions/learnings, kind='insight' for analysis anchored to files (requires files).",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "content": {"type": "string"},
                    "kind": {"type": "string", "enum": ["note", "insight"]},
                    "title": {"type": "string"},
                    "tags": {"type": "array", "items": {"type": "string"}},
                    "repository": {"type": "string"},
                    "initiative": {"type": "string"},
                    "files": {"type": "array", "items": {"type": "string"}, "description": "REQUIRED for kind='insight'"}
                },
                "required": ["content", "kind"]
            }
        },
        {
            "name": "conclude_session",
            "description": "Save an end-of-session summary with the files that changed. Call before ending a session.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "summary": {"type": "string"},
                    "changed_files": {"type": "array", "items": {"type": "string"}},
                    "repository": {"type": "string"},
                    "initiative": {"type": "string"}
                },
                "required": ["summary", "changed_files"]
            }
        },
        {
            "name": "ingest_codebase",
            "description": "Index a repository (delta-synced; large repositories run as async tasks) or poll an ingest task.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "action": {"type": "string", "enum": ["ingest", "status"]},
                    "path": {"type": "string", "description": "Repository root (ingest)"},
                    "repository": {"type": "string"},
                    "force_full": {"type": "boolean", "default": false},
                    "task_id": {"type": "string", "description": "Task to poll (status)"}
                },
                "required": ["action"]
            }
        },
        {
            "name": "validate_insight",
            "description": "Record the outcome of re-verifying a stale insight; optionally deprecate it and save a replacement.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "insight_id": {"type": "string"},
                    "validation_result": {"type": "string", "enum": ["still_valid", "partially_valid", "no_longer_valid"]},
                    "notes": {"type": "string"},
                    "deprecate": {"type": "boolean", "default": false},
                    "replacement_insight": {"type": "string"},
                    "repository": {"type": "string"}
                },
                "required": ["insight_id", "validation_result"]
            }
        },
        {
            "name": "configure_cortex",
            "description": "Update runtime search/staleness settings, set a repository tech stack, configure auto-capture, or fetch current status.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "min_score": {"type": "number"},
                    "verbose": {"type": "boolean"},
                    "recency_boost": {"type": "boolean"},
                    "recency_half_life_days": {"type": "number"},
                    "top_k_retrieve": {"type": "integer", "maximum": 200},
                    "top_k_rerank": {"type": "integer", "maximum": 50},
                    "type_boost": {"type": "boolean"},
                    "type_multipliers": {"type": "object", "additionalProperties": {"type": "number"}},
                    "staleness_check_enabled": {"type": "boolean"},
                    "staleness_check_limit": {"type": "integer"},
                    "staleness_time_threshold_days": {"type": "integer"},
                    "staleness_very_stale_threshold_days": {"type": "integer"},
                    "set_tech_stack": {
                        "type": "object",
                        "properties": {
                            "repository": {"type": "string"},
                            "content": {"type": "string"}
                        },
                        "required": ["repository", "content"]
                    },
                    "autocapture": {
                        "type": "object",
                        "properties": {
                            "enabled": {"type": "boolean"},
                            "auto_commit_async": {"type": "boolean"},
                            "sync_timeout": {"type": "integer"}
                        }
                    },
                    "get_status": {"type": "boolean", "default": false}
                }
            }
        },
        {
            "name": "cleanup_storage",
            "description": "Garbage-collect chunks whose source files no longer exist. Preview first, then execute.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "repository": {"type": "string"},
                    "path": {"type": "string", "description": "Repository root to check files against"},
                    "action": {"type": "string", "enum": ["preview", "execute"]}
                },
                "required": ["repository", "path", "action"]
            }
        },
        {
            "name": "delete_document",
            "description": "Hard-delete a single document by id.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "document_id": {"type": "string"}
                },
                "required": ["document_id"]
            }
        }
    ])
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_twelve_tools_with_schemas() {
        let list = tool_list();
        let tools = list.as_array().unwrap();
        assert_eq!(tools.len(), 12);

        for tool in tools {
            assert!(tool["name"].is_string());
            assert!(tool["description"].is_string());
            assert_eq!(tool["inputSchema"]["type"], "object");
        }
    }

    #[test]
    fn test_no_idiom_type_in_search_schema() {
        let list = tool_list();
        let search = list
            .as_array()
            .unwrap()
            .iter()
            .find(|t| t["name"] == "search_cortex")
            .unwrap();
        let types = &search["inputSchema"]["properties"]["types"]["items"]["enum"];
        assert!(!types.as_array().unwrap().iter().any(|v| v == "idiom"));
    }
}
