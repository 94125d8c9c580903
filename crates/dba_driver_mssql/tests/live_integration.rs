use std::time::Duration;

use dba_core::{Attrib, Conn, CrudOps, DriverConn, Executor, Type};
use dba_driver_mssql::open;
use dba_test_support::containers;

fn connect_mssql(ado_string: String) -> dba_core::Result<Conn> {
    let conn = Conn::new(move || open(&ado_string).map(|c| Box::new(c) as Box<dyn DriverConn>));
    containers::retry_db_operation(Duration::from_secs(30), || {
        conn.exec("SELECT 1", &[])?;
        Ok(())
    })?;
    Ok(conn)
}

#[test]
#[ignore = "requires Docker daemon"]
fn mssql_connect_and_select_one() -> dba_core::Result<()> {
    containers::with_mssql_url(|ado| {
        let conn = connect_mssql(ado)?;
        let mut rows = conn.query("SELECT 1 AS one", &[])?;
        let row = rows.next().expect("one row").expect("no error");
        assert_eq!(row.get(0).to_int64(), 1);
        Ok(())
    })
}

#[test]
#[ignore = "requires Docker daemon"]
fn mssql_crud_roundtrip() -> dba_core::Result<()> {
    containers::with_mssql_url(|ado| {
        let conn = connect_mssql(ado)?;
        conn.exec(
            "CREATE TABLE crud_test (id INT IDENTITY(1,1) PRIMARY KEY, name NVARCHAR(200) NOT NULL, value INT DEFAULT 0)",
            &[],
        )?;

        conn.exec(
            "INSERT INTO crud_test (name, value) VALUES ($1, $2)",
            &[Attrib::set_text("alice"), Attrib::Int32(42)],
        )?;

        let count = CrudOps::count(&conn, "SELECT count(*) FROM crud_test WHERE name = $1", &[Attrib::set_text("alice")])?;
        assert_eq!(count, 1);

        conn.exec(
            "UPDATE crud_test SET value = $1 WHERE name = $2",
            &[Attrib::Int32(99), Attrib::set_text("alice")],
        )?;

        let mut value = Attrib::Null;
        CrudOps::query_row(
            &conn,
            "SELECT value FROM crud_test WHERE name = $1",
            &[Attrib::set_text("alice")],
            &mut [&mut value],
        )?;
        assert_eq!(value.to_int32(), 99);

        conn.exec("DELETE FROM crud_test WHERE name = $1", &[Attrib::set_text("alice")])?;
        let exists = CrudOps::check_existence(&conn, "SELECT 1 FROM crud_test", &[])?;
        assert!(!exists);

        Ok(())
    })
}

#[test]
#[ignore = "requires Docker daemon"]
fn mssql_transaction_commits_and_rolls_back() -> dba_core::Result<()> {
    containers::with_mssql_url(|ado| {
        let conn = connect_mssql(ado)?;
        conn.exec("CREATE TABLE tx_test (id INT IDENTITY(1,1) PRIMARY KEY, name NVARCHAR(200) NOT NULL)", &[])?;

        let tx = conn.begin()?;
        tx.exec("INSERT INTO tx_test (name) VALUES ($1)", &[Attrib::set_text("committed")])?;
        tx.commit()?;
        assert_eq!(CrudOps::count(&conn, "SELECT count(*) FROM tx_test", &[])?, 1);

        let tx = conn.begin()?;
        tx.exec("INSERT INTO tx_test (name) VALUES ($1)", &[Attrib::set_text("rolled-back")])?;
        tx.rollback()?;
        assert_eq!(CrudOps::count(&conn, "SELECT count(*) FROM tx_test", &[])?, 1);

        Ok(())
    })
}

#[test]
#[ignore = "requires Docker daemon"]
fn mssql_geometry_round_trips_through_wkb_varbinary() -> dba_core::Result<()> {
    containers::with_mssql_url(|ado| {
        let conn = connect_mssql(ado)?;
        conn.exec("CREATE TABLE geom_test (id INT IDENTITY(1,1) PRIMARY KEY, shape VARBINARY(MAX))", &[])?;

        let g = dba_core::GeomValue {
            header: dba_core::GeomHeader { num_parts: 1, srid: 4326 },
            flags: dba_core::GeomFlags::DOUBLE,
            parts: vec![],
            vertices: vec![12.5, 41.9],
        };
        conn.exec(
            "INSERT INTO geom_test (shape) VALUES ($1)",
            &[Attrib::geom(Type::GeomPoint, g)],
        )?;

        let mut rows = conn.query("SELECT shape FROM geom_test", &[])?;
        let row = rows.next().expect("one row").expect("no error");
        let (typ, back) = row.get(0).as_geom().expect("geometry column decodes to Attrib::Geom");
        assert_eq!(typ, Type::GeomPoint);
        assert_eq!(back.vertices, vec![12.5, 41.9]);
        Ok(())
    })
}

#[test]
#[ignore = "requires Docker daemon"]
fn mssql_guid_round_trips_through_uniqueidentifier() -> dba_core::Result<()> {
    containers::with_mssql_url(|ado| {
        let conn = connect_mssql(ado)?;
        conn.exec("CREATE TABLE guid_test (id INT IDENTITY(1,1) PRIMARY KEY, token UNIQUEIDENTIFIER)", &[])?;

        let id = dba_core::uuid::Uuid::new_v4();
        conn.exec("INSERT INTO guid_test (token) VALUES ($1)", &[Attrib::Guid(id)])?;

        let mut rows = conn.query("SELECT token FROM guid_test", &[])?;
        let row = rows.next().expect("one row").expect("no error");
        assert_eq!(row.get(0).to_guid(), id);
        Ok(())
    })
}
