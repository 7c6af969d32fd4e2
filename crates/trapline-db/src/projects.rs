//! Project repository

use crate::{Database, Error, Result};
use tokio_postgres::Row;
use trapline_core::model::Project;

const PROJECT_COLUMNS: &str = "id, name, description, boundary, included_species, \
     detection_threshold, blur_people_vehicles, independence_interval_minutes, \
     created_at, updated_at";

pub(crate) fn project_from_row(row: &Row) -> Result<Project> {
    let included_species: Option<serde_json::Value> = row.try_get("included_species")?;
    Ok(Project {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        boundary: row.try_get("boundary")?,
        included_species: included_species
            .map(serde_json::from_value)
            .transpose()?,
        detection_threshold: row.try_get("detection_threshold")?,
        blur_people_vehicles: row.try_get("blur_people_vehicles")?,
        independence_interval_minutes: row.try_get("independence_interval_minutes")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

impl Database {
    /// Create a project (server admins only; enforcement sits in
    /// [`crate::access`]).
    ///
    /// # Errors
    /// Returns an error on query failure.
    pub async fn create_project(&self, name: &str, description: Option<&str>) -> Result<Project> {
        let row = self
            .client()
            .query_one(
                &format!(
                    "INSERT INTO projects (name, description) VALUES ($1, $2) \
                     RETURNING {PROJECT_COLUMNS}"
                ),
                &[&name, &description],
            )
            .await?;
        project_from_row(&row)
    }

    /// Fetch a project by id.
    ///
    /// # Errors
    /// Returns `Error::NotFound` if no such project exists.
    pub async fn get_project(&self, project_id: i32) -> Result<Project> {
        let row = self
            .client()
            .query_opt(
                &format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = $1"),
                &[&project_id],
            )
            .await?
            .ok_or_else(|| Error::not_found("project", project_id))?;
        project_from_row(&row)
    }

    /// All projects, newest first
    ///
    /// # Errors
    /// Returns an error on query failure.
    pub async fn list_projects(&self) -> Result<Vec<Project>> {
        let rows = self
            .client()
            .query(
                &format!("SELECT {PROJECT_COLUMNS} FROM projects ORDER BY created_at DESC"),
                &[],
            )
            .await?;
        rows.iter().map(project_from_row).collect()
    }

    /// Replace the project's included-species list. `None` clears the filter
    /// (all model classes allowed).
    ///
    /// # Errors
    /// Returns `Error::NotFound` if no such project exists.
    pub async fn set_included_species(
        &self,
        project_id: i32,
        species: Option<&[String]>,
    ) -> Result<()> {
        let value = species.map(serde_json::to_value).transpose()?;
        let updated = self
            .client()
            .execute(
                "UPDATE projects SET included_species = $2, updated_at = now() WHERE id = $1",
                &[&project_id, &value],
            )
            .await?;
        if updated == 0 {
            return Err(Error::not_found("project", project_id));
        }
        Ok(())
    }

    /// Delete a project. Memberships, invitations, preferences and linking
    /// tokens cascade; cameras are released back to inventory.
    ///
    /// # Errors
    /// Returns `Error::NotFound` if no such project exists.
    pub async fn delete_project(&self, project_id: i32) -> Result<()> {
        self.client()
            .execute(
                "UPDATE cameras SET project_id = NULL, status = 'inventory' WHERE project_id = $1",
                &[&project_id],
            )
            .await?;
        let deleted = self
            .client()
            .execute("DELETE FROM projects WHERE id = $1", &[&project_id])
            .await?;
        if deleted == 0 {
            return Err(Error::not_found("project", project_id));
        }
        Ok(())
    }
}
