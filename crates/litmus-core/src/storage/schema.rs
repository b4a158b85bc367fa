pub const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS templates (
  id            TEXT PRIMARY KEY,
  kind          TEXT NOT NULL,
  doc_json      TEXT NOT NULL,
  updated_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS runs (
  id                 TEXT PRIMARY KEY,
  template_id        TEXT NOT NULL,
  kind               TEXT NOT NULL,
  status             TEXT NOT NULL,
  completed          INTEGER NOT NULL DEFAULT 0,
  total              INTEGER,
  submitted_at       TEXT NOT NULL,
  started_at         TEXT,
  ended_at           TEXT,
  test_data_json     TEXT NOT NULL,
  pre_request_json   TEXT,
  post_request_json  TEXT,
  template_json      TEXT NOT NULL,
  mission_json       TEXT,
  error_json         TEXT,
  post_error_json    TEXT,
  termination_json   TEXT,
  assessment_json    TEXT,
  cancel_requested   INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_runs_template ON runs(template_id);

CREATE TABLE IF NOT EXISTS results (
  run_id           TEXT NOT NULL,
  case_id          TEXT NOT NULL,
  ordinal          INTEGER NOT NULL,
  status           TEXT NOT NULL,
  doc_json         TEXT NOT NULL,
  annotation_json  TEXT,
  recorded_at      TEXT NOT NULL,
  PRIMARY KEY (run_id, case_id),
  FOREIGN KEY (run_id) REFERENCES runs(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS run_leases (
  run_id          TEXT PRIMARY KEY,
  holder          TEXT NOT NULL,
  heartbeat_ms    INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS files (
  name        TEXT PRIMARY KEY,
  content     BLOB NOT NULL,
  sha256      TEXT NOT NULL,
  created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS judge_cache (
  key          TEXT PRIMARY KEY,
  model        TEXT NOT NULL,
  created_at   TEXT NOT NULL,
  payload_json TEXT NOT NULL
);
"#;
