//! Ranged queries: starred subjects and listen statistics.
//!
//! PendingRemove feedback is invisible here. Every query is scoped to one
//! user and one backend.

use std::collections::BTreeSet;

use sqlx::{QueryBuilder, Sqlite};

use super::{Session, to_i64};
use crate::error::Result;
use crate::model::{
    ArtistId, BackendKind, FindParameters, Range, RangeResults, ReleaseId, SubjectKind, SyncState,
    TrackId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Order {
    /// Most recently listened first
    Recent,
    /// Most listened first
    Top,
}

/// Restrict `track_col` to tracks in every requested cluster and, if asked,
/// credited to the requested artist.
fn push_track_filters(
    qb: &mut QueryBuilder<'_, Sqlite>,
    track_col: &str,
    params: &FindParameters,
    with_artist: bool,
) {
    let clusters: BTreeSet<_> = params.clusters.iter().copied().collect();
    if !clusters.is_empty() {
        qb.push(" AND ")
            .push(track_col)
            .push(" IN (SELECT track_id FROM track_clusters WHERE cluster_id IN (");
        {
            let mut separated = qb.separated(", ");
            for cluster in &clusters {
                separated.push_bind(*cluster);
            }
        }
        qb.push(") GROUP BY track_id HAVING COUNT(DISTINCT cluster_id) = ")
            .push_bind(to_i64(clusters.len()))
            .push(")");
    }

    if with_artist && let Some(artist) = params.artist {
        qb.push(" AND ")
            .push(track_col)
            .push(" IN (SELECT track_id FROM track_artist_links WHERE artist_id = ")
            .push_bind(artist)
            .push(")");
    }
}

fn push_range(qb: &mut QueryBuilder<'_, Sqlite>, range: Option<Range>) {
    if let Some(range) = range {
        // One extra row tells whether more results exist
        qb.push(" LIMIT ")
            .push_bind(to_i64(range.size.saturating_add(1)))
            .push(" OFFSET ")
            .push_bind(to_i64(range.offset));
    }
}

fn into_range_results<T>(
    mut ids: Vec<i64>,
    range: Option<Range>,
    wrap: impl Fn(i64) -> T,
) -> RangeResults<T> {
    let more_results = match range {
        Some(range) if ids.len() > range.size => {
            ids.truncate(range.size);
            true
        }
        _ => false,
    };

    RangeResults {
        results: ids.into_iter().map(wrap).collect(),
        range,
        more_results,
    }
}

impl<M> Session<M> {
    async fn starred_ids(
        &mut self,
        backend: BackendKind,
        kind: SubjectKind,
        params: &FindParameters,
    ) -> Result<Vec<i64>> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT s.subject_id FROM starred s WHERE s.user_id = ");
        qb.push_bind(params.user)
            .push(" AND s.backend = ")
            .push_bind(backend.as_str())
            .push(" AND s.subject_kind = ")
            .push_bind(kind.as_str())
            .push(" AND s.sync_state != ")
            .push_bind(SyncState::PendingRemove.as_str());

        match kind {
            SubjectKind::Track => push_track_filters(&mut qb, "s.subject_id", params, true),
            SubjectKind::Release => {
                if !params.clusters.is_empty() || params.artist.is_some() {
                    qb.push(" AND EXISTS (SELECT 1 FROM tracks t WHERE t.release_id = s.subject_id");
                    push_track_filters(&mut qb, "t.id", params, true);
                    qb.push(")");
                }
            }
            SubjectKind::Artist => {
                if !params.clusters.is_empty() || params.link_role.is_some() {
                    qb.push(
                        " AND EXISTS (SELECT 1 FROM track_artist_links tal WHERE tal.artist_id = s.subject_id",
                    );
                    if let Some(role) = params.link_role {
                        qb.push(" AND tal.role = ").push_bind(role.as_str());
                    }
                    push_track_filters(&mut qb, "tal.track_id", params, false);
                    qb.push(")");
                }
            }
        }

        qb.push(" ORDER BY s.date_time DESC, s.id DESC");
        push_range(&mut qb, params.range);

        Ok(qb.build_query_scalar::<i64>().fetch_all(&mut *self.tx).await?)
    }

    async fn listen_stat_ids(
        &mut self,
        backend: BackendKind,
        kind: SubjectKind,
        order: Order,
        params: &FindParameters,
    ) -> Result<Vec<i64>> {
        let id_expr = match kind {
            SubjectKind::Artist => "tal.artist_id",
            SubjectKind::Release => "t.release_id",
            SubjectKind::Track => "t.id",
        };

        let mut qb = QueryBuilder::<Sqlite>::new("SELECT ");
        qb.push(id_expr)
            .push(" FROM listens l JOIN tracks t ON t.id = l.track_id");
        if kind == SubjectKind::Artist {
            qb.push(" JOIN track_artist_links tal ON tal.track_id = t.id");
        }
        qb.push(" WHERE l.user_id = ")
            .push_bind(params.user)
            .push(" AND l.backend = ")
            .push_bind(backend.as_str());

        match kind {
            SubjectKind::Release => {
                qb.push(" AND t.release_id IS NOT NULL");
            }
            SubjectKind::Artist => {
                if let Some(role) = params.link_role {
                    qb.push(" AND tal.role = ").push_bind(role.as_str());
                }
            }
            SubjectKind::Track => {}
        }
        push_track_filters(&mut qb, "t.id", params, true);

        qb.push(" GROUP BY ").push(id_expr);
        match order {
            Order::Recent => qb.push(" ORDER BY MAX(l.date_time) DESC, "),
            Order::Top => qb.push(" ORDER BY COUNT(DISTINCT l.id) DESC, "),
        };
        qb.push(id_expr);
        push_range(&mut qb, params.range);

        Ok(qb.build_query_scalar::<i64>().fetch_all(&mut *self.tx).await?)
    }

    /// Starred artists, most recently starred first.
    pub async fn find_starred_artists(
        &mut self,
        backend: BackendKind,
        params: &FindParameters,
    ) -> Result<RangeResults<ArtistId>> {
        let ids = self.starred_ids(backend, SubjectKind::Artist, params).await?;
        Ok(into_range_results(ids, params.range, ArtistId))
    }

    /// Starred releases, most recently starred first.
    pub async fn find_starred_releases(
        &mut self,
        backend: BackendKind,
        params: &FindParameters,
    ) -> Result<RangeResults<ReleaseId>> {
        let ids = self.starred_ids(backend, SubjectKind::Release, params).await?;
        Ok(into_range_results(ids, params.range, ReleaseId))
    }

    /// Starred tracks, most recently starred first.
    pub async fn find_starred_tracks(
        &mut self,
        backend: BackendKind,
        params: &FindParameters,
    ) -> Result<RangeResults<TrackId>> {
        let ids = self.starred_ids(backend, SubjectKind::Track, params).await?;
        Ok(into_range_results(ids, params.range, TrackId))
    }

    pub async fn recent_artists(
        &mut self,
        backend: BackendKind,
        params: &FindParameters,
    ) -> Result<RangeResults<ArtistId>> {
        let ids = self
            .listen_stat_ids(backend, SubjectKind::Artist, Order::Recent, params)
            .await?;
        Ok(into_range_results(ids, params.range, ArtistId))
    }

    pub async fn recent_releases(
        &mut self,
        backend: BackendKind,
        params: &FindParameters,
    ) -> Result<RangeResults<ReleaseId>> {
        let ids = self
            .listen_stat_ids(backend, SubjectKind::Release, Order::Recent, params)
            .await?;
        Ok(into_range_results(ids, params.range, ReleaseId))
    }

    pub async fn recent_tracks(
        &mut self,
        backend: BackendKind,
        params: &FindParameters,
    ) -> Result<RangeResults<TrackId>> {
        let ids = self
            .listen_stat_ids(backend, SubjectKind::Track, Order::Recent, params)
            .await?;
        Ok(into_range_results(ids, params.range, TrackId))
    }

    pub async fn top_artists(
        &mut self,
        backend: BackendKind,
        params: &FindParameters,
    ) -> Result<RangeResults<ArtistId>> {
        let ids = self
            .listen_stat_ids(backend, SubjectKind::Artist, Order::Top, params)
            .await?;
        Ok(into_range_results(ids, params.range, ArtistId))
    }

    pub async fn top_releases(
        &mut self,
        backend: BackendKind,
        params: &FindParameters,
    ) -> Result<RangeResults<ReleaseId>> {
        let ids = self
            .listen_stat_ids(backend, SubjectKind::Release, Order::Top, params)
            .await?;
        Ok(into_range_results(ids, params.range, ReleaseId))
    }

    pub async fn top_tracks(
        &mut self,
        backend: BackendKind,
        params: &FindParameters,
    ) -> Result<RangeResults<TrackId>> {
        let ids = self
            .listen_stat_ids(backend, SubjectKind::Track, Order::Top, params)
            .await?;
        Ok(into_range_results(ids, params.range, TrackId))
    }
}
