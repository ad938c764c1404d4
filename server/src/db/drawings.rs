use data::annotation::{Annotation, AnnotationKind, AnnotationPatch, DrawingPoint, Style};
use rusqlite::{Connection, OptionalExtension, params};

use crate::error::ApiError;

const COLUMNS: &str = "id, symbol, type, points, style, created_at, updated_at";

type RawRow = (i64, String, String, String, String, u64, u64);

fn raw_row(row: &rusqlite::Row) -> rusqlite::Result<RawRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

fn decode(raw: RawRow) -> Result<Annotation, ApiError> {
    let (id, symbol, kind, points, style, created_at, updated_at) = raw;
    let kind: AnnotationKind = kind
        .parse()
        .map_err(|e: data::annotation::AnnotationError| ApiError::Internal(e.to_string()))?;
    Ok(Annotation {
        id,
        symbol,
        kind,
        points: serde_json::from_str(&points)?,
        style: serde_json::from_str(&style)?,
        created_at,
        updated_at,
    })
}

/// All drawings for a symbol, in creation order.
pub fn list(conn: &Connection, symbol: &str) -> Result<Vec<Annotation>, ApiError> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {COLUMNS} FROM drawings WHERE symbol = ?1 ORDER BY created_at ASC, id ASC"
    ))?;
    let raw = stmt
        .query_map(params![symbol], raw_row)?
        .collect::<Result<Vec<_>, _>>()?;
    raw.into_iter().map(decode).collect()
}

pub fn get(conn: &Connection, id: i64) -> Result<Option<Annotation>, ApiError> {
    let raw = conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM drawings WHERE id = ?1"),
            params![id],
            raw_row,
        )
        .optional()?;
    raw.map(decode).transpose()
}

pub fn create(
    conn: &Connection,
    symbol: &str,
    kind: AnnotationKind,
    points: &[DrawingPoint],
    style: &Style,
    now_ms: u64,
) -> Result<Annotation, ApiError> {
    conn.execute(
        "INSERT INTO drawings (symbol, type, points, style, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            symbol,
            kind.as_str(),
            serde_json::to_string(points)?,
            serde_json::to_string(style)?,
            now_ms,
            now_ms,
        ],
    )?;
    Ok(Annotation {
        id: conn.last_insert_rowid(),
        symbol: symbol.to_owned(),
        kind,
        points: points.to_vec(),
        style: style.clone(),
        created_at: now_ms,
        updated_at: now_ms,
    })
}

/// Apply a partial update. Returns `None` for an unknown id; the type
/// and symbol columns are never touched. The read and the write share
/// one transaction so a concurrent patch cannot slip between them.
pub fn update(
    conn: &mut Connection,
    id: i64,
    patch: AnnotationPatch,
    now_ms: u64,
) -> Result<Option<Annotation>, ApiError> {
    let tx = conn.transaction()?;

    let Some(mut annotation) = get(&tx, id)? else {
        return Ok(None);
    };

    if let Some(points) = patch.points {
        Annotation::validate_points(annotation.kind, &points)
            .map_err(|e| ApiError::BadRequest(e.to_string()))?;
        annotation.points = points;
    }
    if let Some(style) = patch.style {
        annotation.style.merge(style);
    }
    annotation.updated_at = now_ms;

    tx.execute(
        "UPDATE drawings SET points = ?1, style = ?2, updated_at = ?3 WHERE id = ?4",
        params![
            serde_json::to_string(&annotation.points)?,
            serde_json::to_string(&annotation.style)?,
            now_ms,
            id,
        ],
    )?;
    tx.commit()?;
    Ok(Some(annotation))
}

pub fn delete(conn: &Connection, id: i64) -> Result<bool, ApiError> {
    let changed = conn.execute("DELETE FROM drawings WHERE id = ?1", params![id])?;
    Ok(changed > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{init_schema, pool::open_memory_pool};

    fn seeded_conn() -> r2d2::PooledConnection<r2d2_sqlite::SqliteConnectionManager> {
        let pool = open_memory_pool();
        let conn = pool.get().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    #[test]
    fn create_then_list_round_trips() {
        let conn = seeded_conn();
        let points = vec![DrawingPoint::new(1_000, 100.0)];
        let style = Style::defaults_for(AnnotationKind::HLine);

        let created =
            create(&conn, "BTCUSDT", AnnotationKind::HLine, &points, &style, 42).unwrap();
        assert!(created.id > 0);

        let listed = list(&conn, "BTCUSDT").unwrap();
        assert_eq!(listed, vec![created]);
        assert!(list(&conn, "ETHUSDT").unwrap().is_empty());
    }

    #[test]
    fn patching_points_keeps_id_and_type() {
        let mut conn = seeded_conn();
        let corners = vec![DrawingPoint::new(0, 100.0), DrawingPoint::new(1_000, 200.0)];
        let style = Style::defaults_for(AnnotationKind::Rect);
        let created = create(&conn, "BTCUSDT", AnnotationKind::Rect, &corners, &style, 1).unwrap();

        let moved = vec![DrawingPoint::new(0, 150.0), DrawingPoint::new(1_000, 200.0)];
        let updated = update(&mut conn, created.id, AnnotationPatch::points(moved.clone()), 2)
            .unwrap()
            .unwrap();

        assert_eq!(updated.id, created.id);
        assert_eq!(updated.kind, AnnotationKind::Rect);
        assert_eq!(updated.points, moved);
        assert_eq!(updated.updated_at, 2);
        assert_eq!(get(&conn, created.id).unwrap().unwrap(), updated);
    }

    #[test]
    fn patch_with_wrong_point_count_is_rejected() {
        let mut conn = seeded_conn();
        let corners = vec![DrawingPoint::new(0, 100.0), DrawingPoint::new(1_000, 200.0)];
        let style = Style::defaults_for(AnnotationKind::Rect);
        let created = create(&conn, "BTCUSDT", AnnotationKind::Rect, &corners, &style, 1).unwrap();

        let bad = AnnotationPatch::points(vec![DrawingPoint::new(0, 150.0)]);
        let err = update(&mut conn, created.id, bad, 2).unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));

        // The stored row is untouched.
        assert_eq!(get(&conn, created.id).unwrap().unwrap().points, corners);
    }

    #[test]
    fn successive_partial_patches_compose() {
        let mut conn = seeded_conn();
        let corners = vec![DrawingPoint::new(0, 100.0), DrawingPoint::new(1_000, 200.0)];
        let style = Style::defaults_for(AnnotationKind::Rect);
        let created = create(&conn, "BTCUSDT", AnnotationKind::Rect, &corners, &style, 1).unwrap();

        let restyle = Style {
            color: Some("#ff0000".to_owned()),
            ..Style::default()
        };
        update(&mut conn, created.id, AnnotationPatch::style(restyle), 2)
            .unwrap()
            .unwrap();

        let moved = vec![DrawingPoint::new(0, 150.0), DrawingPoint::new(1_000, 250.0)];
        let updated = update(&mut conn, created.id, AnnotationPatch::points(moved.clone()), 3)
            .unwrap()
            .unwrap();

        // The second patch read the first one's committed merge.
        assert_eq!(updated.points, moved);
        assert_eq!(updated.style.color.as_deref(), Some("#ff0000"));
        assert_eq!(get(&conn, created.id).unwrap().unwrap(), updated);
    }

    #[test]
    fn missing_ids_surface_as_none() {
        let mut conn = seeded_conn();
        assert!(get(&conn, 99).unwrap().is_none());
        assert!(
            update(&mut conn, 99, AnnotationPatch::default(), 1)
                .unwrap()
                .is_none()
        );
        assert!(!delete(&conn, 99).unwrap());
    }

    #[test]
    fn delete_removes_the_row() {
        let conn = seeded_conn();
        let points = vec![DrawingPoint::new(1_000, 100.0)];
        let style = Style::defaults_for(AnnotationKind::HLine);
        let created =
            create(&conn, "BTCUSDT", AnnotationKind::HLine, &points, &style, 1).unwrap();

        assert!(delete(&conn, created.id).unwrap());
        assert!(get(&conn, created.id).unwrap().is_none());
    }
}
